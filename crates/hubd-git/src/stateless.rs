//! Stateless smart-HTTP transport bridge
//!
//! Wire-level protocol execution is delegated to the git transport
//! binaries: for a request we spawn `git-upload-pack` or
//! `git-receive-pack` with `--stateless-rpc`, feed the request body to its
//! stdin and stream its stdout back to the client. The advertise phase
//! additionally prefixes the pkt-line service header required by the
//! smart-HTTP protocol. Dropping the returned future kills the child.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

use crate::pktline::{packet_line, FLUSH_PKT};
use crate::repo::Repository;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    UploadPack,
    ReceivePack,
}

impl Service {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "git-upload-pack" => Some(Service::UploadPack),
            "git-receive-pack" => Some(Service::ReceivePack),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Service::UploadPack => "git-upload-pack",
            Service::ReceivePack => "git-receive-pack",
        }
    }

    pub fn advertisement_content_type(&self) -> &'static str {
        match self {
            Service::UploadPack => "application/x-git-upload-pack-advertisement",
            Service::ReceivePack => "application/x-git-receive-pack-advertisement",
        }
    }

    pub fn result_content_type(&self) -> &'static str {
        match self {
            Service::UploadPack => "application/x-git-upload-pack-result",
            Service::ReceivePack => "application/x-git-receive-pack-result",
        }
    }
}

/// Run one stateless exchange against the repository at `repo_path`.
pub async fn run<O, I>(
    repo_path: &Path,
    output: &mut O,
    input: Option<I>,
    service: Service,
    advertise: bool,
) -> Result<()>
where
    O: AsyncWrite + Unpin,
    I: AsyncRead + Unpin,
{
    let dir = repo_path
        .file_name()
        .ok_or_else(|| Error::Transport("repository path has no final component".into()))?;
    let base = repo_path.parent().unwrap_or_else(|| Path::new("."));

    if advertise {
        let header = packet_line(&format!("# service={}\n", service.name()));
        output.write_all(&header).await?;
        output.write_all(FLUSH_PKT).await?;
    }

    let mut cmd = Command::new(service.name());
    cmd.arg("--stateless-rpc");
    if advertise {
        cmd.arg("--advertise-refs");
    }
    cmd.arg(dir)
        .current_dir(base)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    debug!(service = service.name(), advertise, repo = %repo_path.display(), "stateless rpc");
    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Transport(format!("failed to spawn {}: {e}", service.name())))?;

    let stdin = child.stdin.take();
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Transport("child stdout unavailable".into()))?;

    let feed = async {
        if let (Some(mut stdin), Some(mut input)) = (stdin, input) {
            tokio::io::copy(&mut input, &mut stdin).await?;
            stdin.shutdown().await?;
        }
        Ok::<_, std::io::Error>(())
    };
    let drain = tokio::io::copy(&mut stdout, output);

    let (fed, drained) = tokio::join!(feed, drain);
    fed?;
    drained?;

    let status = child.wait().await?;
    if !status.success() {
        return Err(Error::Transport(format!(
            "{} exited with {status}",
            service.name()
        )));
    }
    Ok(())
}

impl Repository {
    /// Stream the smart-HTTP protocol for this repository. See [`run`].
    pub async fn stateless<O, I>(
        &self,
        output: &mut O,
        input: Option<I>,
        service: Service,
        advertise: bool,
    ) -> Result<()>
    where
        O: AsyncWrite + Unpin,
        I: AsyncRead + Unpin,
    {
        run(self.path(), output, input, service, advertise).await
    }
}
