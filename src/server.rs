use crate::config::Config;
use crate::errors::{DeskError, DeskErrorType, Result};
use crate::locations::get_db_path;
use crate::pipeline::BuildPipeline;
use crate::previews::PreviewSurface;
use crate::routes;
use crate::session::{Services, SessionManager};
use crate::storage::SledStore;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::signal;

pub(crate) struct Server {
    manager: Arc<Mutex<SessionManager>>,
    addr: SocketAddr,
    session_idle: Duration,
}

/// Periodically closes sessions idle for longer than `max_idle`.
async fn sweep_idle_sessions(manager: Arc<Mutex<SessionManager>>, max_idle: Duration) {
    let mut interval = tokio::time::interval((max_idle / 4).max(Duration::from_secs(1)));
    loop {
        interval.tick().await;
        let manager = manager.clone();
        let swept = tokio::task::spawn_blocking(move || {
            manager
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .expire_idle(max_idle)
        })
        .await;
        if let Err(e) = swept {
            tracing::error!("Idle session sweep failed: {}", e);
        }
    }
}

impl Server {
    pub(crate) async fn start(&self) -> Result<()> {
        let (addr, server) = warp::serve(routes::routes(self.manager.clone()))
            .try_bind_with_graceful_shutdown(self.addr, async {
                if let Err(e) = signal::ctrl_c().await {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                }
            })
            .map_err(|e| {
                DeskError::new(
                    DeskErrorType::InternalError,
                    format!("Could not bind to {}: {}", self.addr, e),
                )
            })?;
        tracing::info!("Listening on {}", addr);
        let sweeper = tokio::spawn(sweep_idle_sessions(
            self.manager.clone(),
            self.session_idle,
        ));
        server.await;
        sweeper.abort();
        tracing::info!("Shutting down server...");
        Ok(())
    }
}

pub(crate) fn get_server(config: &Config) -> Result<Server> {
    let store = SledStore::open(&get_db_path(&config.storage_dir))?;
    let services = Services {
        store: Arc::new(store),
        previews: Arc::new(PreviewSurface::new("/previews")),
        pipeline: BuildPipeline::new(
            config.transpiler.clone(),
            config.source_extension.clone(),
            config.runtime.clone(),
        ),
        require_license: config.require_license,
    };
    Ok(Server {
        manager: Arc::new(Mutex::new(SessionManager::new(Arc::new(services)))),
        addr: SocketAddr::from(([127, 0, 0, 1], config.port)),
        session_idle: config.session_idle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::services;

    #[tokio::test]
    async fn test_sweeper_closes_idle_sessions() {
        let manager = Arc::new(Mutex::new(SessionManager::new(services(false))));
        let kept = {
            let mut manager = manager.lock().unwrap();
            drop(manager.open("ada").unwrap());
            manager.open("bob").unwrap()
        };
        let sweeper = tokio::spawn(sweep_idle_sessions(manager.clone(), Duration::ZERO));
        tokio::time::sleep(Duration::from_millis(200)).await;
        sweeper.abort();
        assert_eq!(manager.lock().unwrap().len(), 1);
        drop(kept);
    }
}
