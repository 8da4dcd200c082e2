// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Target server process management with zombie process protection.
//!
//! The proxied MCP server must not outlive the proxy: on Linux the child is
//! bound to the parent with PR_SET_PDEATHSIG, on Windows it is assigned to a
//! Job Object with kill-on-close, elsewhere tokio's kill_on_drop is the
//! fallback.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::core::errors::ProxyError;

#[cfg(windows)]
use win32job::Job;

pub struct UpstreamProcess {
    kill_tx: Option<oneshot::Sender<()>>,
    #[cfg(windows)]
    _job: Option<Job>,
}

pub type UpstreamSpawn = (
    UpstreamProcess,
    Box<dyn AsyncWrite + Unpin + Send>,
    Box<dyn AsyncRead + Unpin + Send>,
    Box<dyn AsyncRead + Unpin + Send>,
);

impl UpstreamProcess {
    pub fn spawn(cmd: &str, args: &[String]) -> Result<UpstreamSpawn, ProxyError> {
        debug!("spawning target server '{}' with args {:?}", cmd, args);

        let mut command = Command::new(cmd);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "linux")]
        // SAFETY: PR_SET_PDEATHSIG with SIGKILL is the standard Linux
        // mechanism to terminate the child when the parent dies. The integer
        // constants come from the libc crate and are valid on this platform.
        unsafe {
            command.pre_exec(|| {
                let ret = libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL);
                if ret != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        #[cfg(windows)]
        let job = {
            let job = Job::create().map_err(|e| {
                ProxyError::transport(format!("failed to create Job Object: {}", e))
            })?;
            let mut info = job.query_extended_limit_info().map_err(|e| {
                ProxyError::transport(format!("failed to query job info: {}", e))
            })?;
            info.limit_kill_on_job_close();
            job.set_extended_limit_info(&info).map_err(|e| {
                ProxyError::transport(format!("failed to set job limits: {}", e))
            })?;
            Some(job)
        };

        let mut child = command.spawn().map_err(|e| {
            ProxyError::transport(format!("failed to spawn target server '{}': {}", cmd, e))
        })?;

        #[cfg(windows)]
        if let Some(ref job) = job {
            if let Some(handle) = child.raw_handle() {
                job.assign_process(handle as isize).map_err(|e| {
                    ProxyError::transport(format!("failed to assign process to Job Object: {}", e))
                })?;
            }
        }

        let stdin = child
            .stdin
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncWrite + Unpin + Send>)
            .ok_or_else(|| ProxyError::transport("child stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
            .ok_or_else(|| ProxyError::transport("child stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
            .ok_or_else(|| ProxyError::transport("child stderr not captured"))?;

        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(async move {
            tokio::select! {
                _ = kill_rx => {
                    let _ = child.kill().await;
                }
                status = child.wait() => {
                    match status {
                        Ok(s) => info!(code = ?s.code(), "target server exited"),
                        Err(e) => info!("target server wait failed: {}", e),
                    }
                }
            }
        });

        Ok((
            Self {
                kill_tx: Some(kill_tx),
                #[cfg(windows)]
                _job: job,
            },
            stdin,
            stdout,
            stderr,
        ))
    }

    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for UpstreamProcess {
    fn drop(&mut self) {
        self.kill();
        // On Windows, _job is dropped here, which triggers
        // LIMIT_KILL_ON_JOB_CLOSE if the process is still running.
    }
}
