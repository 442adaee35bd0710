use crate::vtree::{Directory, Node, VirtualFileTree};

/// Concatenates every source file in the tree into one compilation unit.
///
/// Folders are walked depth first in display order. Each source file adds its
/// contents followed by a newline; files without the source extension are
/// assets for the preview page and are skipped.
pub(crate) fn aggregate(tree: &VirtualFileTree, source_extension: &str) -> String {
    let mut unit = String::new();
    collect(tree.root(), source_extension, &mut unit);
    unit
}

fn collect(folder: &Directory, source_extension: &str, unit: &mut String) {
    for (name, child) in folder.iter() {
        match child {
            Node::File(contents) => {
                if name.ends_with(source_extension) {
                    unit.push_str(contents);
                    unit.push('\n');
                }
            }
            Node::Directory(d) => collect(d, source_extension, unit),
        }
    }
}
