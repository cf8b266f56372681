//! Control socket listener

use anyhow::{Context, Result};
use std::os::unix::net::UnixStream;
use tracing::{debug, error, info, warn};

use super::{ControlRequest, ControlResponse, ControlServer, read_message, write_message};
use crate::attract::Attract;
use crate::control;
use crate::scheduler::Scheduler;

/// Spawn the listener thread. Connections are served one at a time; every
/// request counts as activity for attract mode before it runs.
pub fn spawn_control_listener(
    server: ControlServer,
    scheduler: Scheduler,
    attract: Attract,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        if let Err(e) = run_control_loop(&server, &scheduler, &attract) {
            error!(error = ?e, "Control listener thread crashed");
        }
    })
}

fn run_control_loop(server: &ControlServer, scheduler: &Scheduler, attract: &Attract) -> Result<()> {
    info!(socket = %server.path().display(), "Control listener started");

    loop {
        let stream = server.accept().context("Failed to accept control connection")?;
        debug!("Control client connected");
        serve_client(stream, scheduler, attract);
        debug!("Control client disconnected");
    }
}

fn serve_client(mut stream: UnixStream, scheduler: &Scheduler, attract: &Attract) {
    loop {
        let request: ControlRequest = match read_message(&mut stream) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = ?e, "Control connection closed");
                return;
            }
        };

        attract.notify_activity();
        let status = control::handle(&request.command, &request.params, scheduler);
        info!(command = %request.command, status = %status, "Control request handled");
        debug!(state = ?scheduler.snapshot(), "Scheduler state");

        if let Err(e) = write_message(&mut stream, &ControlResponse { status }) {
            warn!(error = ?e, "Failed to send control response");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::constants::response;
    use crate::ipc::ControlClient;
    use crate::surface::SurfaceDispatcher;
    use crate::surface::recording::RecordingSurface;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Handle;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_round_trip_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("galaga.png"), b"").unwrap();
        let settings = Settings {
            artwork_path: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let surface = Arc::new(RecordingSurface::default());
        let dispatcher = SurfaceDispatcher::spawn(surface, &Handle::current(), 1, Duration::from_millis(10));
        let scheduler = Scheduler::new(Arc::new(settings), dispatcher, Handle::current());
        let attract = Attract::new(scheduler.clone(), Handle::current());

        let socket = dir.path().join("control.sock");
        let server = ControlServer::bind_to(socket.clone()).unwrap();
        spawn_control_listener(server, scheduler.clone(), attract);

        let statuses = tokio::task::spawn_blocking(move || {
            let mut client = ControlClient::connect_to(&socket).unwrap();
            let picture = ControlRequest::new("display/picture")
                .param("path", "galaga")
                .param("duration", "-1");
            vec![
                client.request(&picture).unwrap().status,
                client.request(&ControlRequest::new("version")).unwrap().status,
                client.request(&ControlRequest::new("display/nope")).unwrap().status,
            ]
        })
        .await
        .unwrap();

        assert_eq!(statuses, vec![response::OK, env!("CARGO_PKG_VERSION"), response::NOT_IMPLEMENTED]);
        assert!(scheduler.snapshot().current.is_some());
    }
}
