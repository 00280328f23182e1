//! Server launch: run the request-serving process in the foreground.

use crate::command::{exit_code_of, CommandLine};
use crate::error::BootstrapError;
use async_trait::async_trait;
use tokio::process::Child;
use tracing::{info, warn};

pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Starts the long-running server and reports how it ended.
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    fn describe(&self) -> String;

    /// Run until the server exits; returns its exit code.
    async fn launch(&self) -> Result<i32, BootstrapError>;
}

/// Runs the server as a child process bound to a fixed host and port.
///
/// The bind address is passed to the child as `HOST` and `PORT`. Interrupt
/// and terminate signals received while the child runs are forwarded to it.
/// There is no restart policy.
pub struct CommandServer {
    command: CommandLine,
    host: String,
    port: u16,
}

impl CommandServer {
    pub fn new(command: CommandLine, host: impl Into<String>, port: u16) -> Self {
        Self {
            command,
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl ServerLauncher for CommandServer {
    fn describe(&self) -> String {
        format!("`{}` on {}:{}", self.command, self.host, self.port)
    }

    async fn launch(&self) -> Result<i32, BootstrapError> {
        let mut child = self
            .command
            .to_command()
            .env("HOST", &self.host)
            .env("PORT", self.port.to_string())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BootstrapError::Spawn {
                role: "server",
                program: self.command.program.clone(),
                source,
            })?;

        info!(pid = child.id(), command = %self.command, "Server process started");

        let status = tokio::select! {
            status = child.wait() => status?,
            signal = shutdown_signal() => {
                warn!(?signal, "Shutdown requested, forwarding to server");
                forward(&mut child, signal)?;
                child.wait().await?
            }
        };

        let code = exit_code_of(status);
        info!(code, "Server process exited");
        Ok(code)
    }
}

/// A termination request received by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Interrupt,
    Terminate,
}

/// Resolves on the first interrupt or terminate signal.
async fn shutdown_signal() -> Shutdown {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Shutdown::Interrupt,
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                Shutdown::Terminate
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Shutdown>();

    tokio::select! {
        s = ctrl_c => s,
        s = terminate => s,
    }
}

#[cfg(unix)]
fn forward(child: &mut Child, shutdown: Shutdown) -> std::io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // Already reaped: nothing to signal.
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let signal = match shutdown {
        Shutdown::Interrupt => Signal::SIGINT,
        Shutdown::Terminate => Signal::SIGTERM,
    };
    kill(Pid::from_raw(pid as i32), signal).map_err(std::io::Error::from)
}

#[cfg(not(unix))]
fn forward(child: &mut Child, _shutdown: Shutdown) -> std::io::Result<()> {
    child.start_kill()
}
