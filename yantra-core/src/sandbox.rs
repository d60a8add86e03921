use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tempdir::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, info, warn};

use crate::{ErrContext, Error, Result};

/// Resource caps applied to one sandboxed run. The memory and cpu values are
/// passed through to the container runtime verbatim (e.g. "512m", "1").
#[derive(Debug, Clone)]
pub struct ExecLimits {
    pub memory: String,
    pub cpus: String,
    pub timeout_seconds: u64,
}

/// Captured streams of a finished sandbox run. A non-zero exit code of the
/// contained command is not an error; the caller gets the streams either way.
#[derive(Debug)]
pub struct ExecOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug)]
pub struct BuildOutput {
    pub success: bool,
    /// Combined stdout and stderr of the builder.
    pub log: String,
}

/// Exit code the docker CLI reserves for its own failures (missing image,
/// daemon errors). Anything else is the contained command's exit code.
const RUNTIME_FAILURE_EXIT: i32 = 125;

/// Abstraction over the container runtime: build an image from a recipe, run
/// a container with the full isolation contract, remove an image.
///
/// The executor owns no persistent state and never consults the store; it
/// shells out to the runtime binary and enforces wall-clock ceilings by
/// killing the spawned process.
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    runtime_bin: String,
    mount_path: String,
    build_timeout: Duration,
}

impl SandboxExecutor {
    pub fn new(runtime_bin: &str, mount_path: &str, build_timeout_secs: u64) -> Self {
        Self {
            runtime_bin: runtime_bin.to_string(),
            mount_path: mount_path.to_string(),
            build_timeout: Duration::from_secs(build_timeout_secs),
        }
    }

    /// Writes `dockerfile` into a fresh temporary build context and builds
    /// `image_tag` from it. Returns the combined builder output; fails with
    /// [`Error::BuildTimeout`] when the ceiling is hit.
    pub async fn build_image(&self, dockerfile: &str, image_tag: &str) -> Result<BuildOutput> {
        let context = TempDir::new("yantra-build").context("failed to create build context")?;
        tokio::fs::write(context.path().join("Dockerfile"), dockerfile)
            .await
            .context("failed to write Dockerfile")?;

        info!(image = %image_tag, "building image");
        let args = build_args(image_tag, context.path());
        debug!(?args, "invoking builder");

        let child = Command::new(&self.runtime_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn container runtime for build")?;

        // Dropping the in-flight future on timeout kills the builder.
        let output = match time::timeout(self.build_timeout, child.wait_with_output()).await {
            Ok(output) => output.context("builder did not exit cleanly")?,
            Err(_) => {
                return Err(Error::BuildTimeout {
                    seconds: self.build_timeout.as_secs(),
                })
            }
        };

        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !log.is_empty() && !log.ends_with('\n') {
                log.push('\n');
            }
            log.push_str(&stderr);
        }

        Ok(BuildOutput {
            success: output.status.success(),
            log,
        })
    }

    /// Runs `argv` inside a container of `image_tag` under the full isolation
    /// contract, feeding `stdin_bytes` on standard input. `files_dir`, when
    /// present, is bind-mounted read-only at the configured mount path.
    pub async fn run_sandboxed(
        &self,
        image_tag: &str,
        argv: &[String],
        stdin_bytes: &[u8],
        files_dir: Option<&Path>,
        limits: &ExecLimits,
    ) -> Result<ExecOutput> {
        let args = run_args(image_tag, argv, files_dir, &self.mount_path, limits);
        debug!(image = %image_tag, ?args, "spawning sandbox");

        let mut child = Command::new(&self.runtime_bin)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn container runtime")?;

        // Feed the code and close the pipe so runtimes reading from stdin
        // see EOF. Written from a task in case the sandbox never reads.
        if let Some(mut stdin) = child.stdin.take() {
            let bytes = stdin_bytes.to_vec();
            tokio::spawn(async move {
                let _ = stdin.write_all(&bytes).await;
                let _ = stdin.shutdown().await;
            });
        }

        let timeout = Duration::from_secs(limits.timeout_seconds);
        let output = match time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output.context("sandbox did not exit cleanly")?,
            Err(_) => {
                return Err(Error::ExecTimeout {
                    seconds: limits.timeout_seconds,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = output.status.code();

        if exit_code == Some(RUNTIME_FAILURE_EXIT) {
            return Err(Error::Other(anyhow::anyhow!(
                "container runtime failed: {}",
                stderr.trim()
            )));
        }

        Ok(ExecOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    /// Best-effort image removal; a missing image is not an error.
    pub async fn remove_image(&self, image_tag: &str) {
        info!(image = %image_tag, "removing image");
        let result = Command::new(&self.runtime_bin)
            .args(["rmi", "-f", image_tag])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        match result {
            Ok(output) if !output.status.success() => {
                warn!(
                    image = %image_tag,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "image removal failed"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(image = %image_tag, error = %e, "could not invoke image removal"),
        }
    }
}

fn build_args(image_tag: &str, context: &Path) -> Vec<String> {
    vec![
        "build".to_string(),
        "-t".to_string(),
        image_tag.to_string(),
        context.to_string_lossy().into_owned(),
    ]
}

/// The full isolation flag set: gVisor runtime, no network, capped memory
/// and cpu, read-only root, attached stdin, `/sandbox` working directory,
/// auto-removal on exit. Omitting any of these breaks the sandbox contract.
fn run_args(
    image_tag: &str,
    argv: &[String],
    files_dir: Option<&Path>,
    mount_path: &str,
    limits: &ExecLimits,
) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--runtime=runsc".to_string(),
        "--rm".to_string(),
        "--network=none".to_string(),
        format!("--memory={}", limits.memory),
        format!("--cpus={}", limits.cpus),
        "--read-only".to_string(),
        "-i".to_string(),
        "-w".to_string(),
        "/sandbox".to_string(),
    ];

    if let Some(dir) = files_dir {
        args.push("-v".to_string());
        args.push(format!("{}:{}:ro", dir.to_string_lossy(), mount_path));
    }

    args.push(image_tag.to_string());
    args.extend(argv.iter().cloned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn limits() -> ExecLimits {
        ExecLimits {
            memory: "512m".into(),
            cpus: "1".into(),
            timeout_seconds: 10,
        }
    }

    #[test]
    fn run_args_assert_every_isolation_flag() {
        let argv = vec!["python".to_string(), "-".to_string()];
        let args = run_args("yantra-python-3.12:latest", &argv, None, "/data", &limits());

        for flag in [
            "--runtime=runsc",
            "--rm",
            "--network=none",
            "--memory=512m",
            "--cpus=1",
            "--read-only",
            "-i",
        ] {
            assert!(args.contains(&flag.to_string()), "missing flag {flag}");
        }

        let w = args.iter().position(|a| a == "-w").unwrap();
        assert_eq!(args[w + 1], "/sandbox");

        // image comes before the argv, argv is passed through in order
        let image = args
            .iter()
            .position(|a| a == "yantra-python-3.12:latest")
            .unwrap();
        assert_eq!(&args[image + 1..], &["python", "-"]);
        assert!(!args.contains(&"-v".to_string()));
    }

    #[test]
    fn run_args_mount_job_directory_read_only() {
        let argv = vec!["python".to_string(), "-".to_string()];
        let dir = PathBuf::from("/tmp/executor_jobs/abc");
        let args = run_args(
            "yantra-python-3.12:latest",
            &argv,
            Some(&dir),
            "/data",
            &limits(),
        );

        let v = args.iter().position(|a| a == "-v").unwrap();
        assert_eq!(args[v + 1], "/tmp/executor_jobs/abc:/data:ro");
    }

    #[test]
    fn build_args_tag_and_context() {
        let args = build_args("yantra-go-1.22:latest", Path::new("/tmp/ctx"));
        assert_eq!(args, vec!["build", "-t", "yantra-go-1.22:latest", "/tmp/ctx"]);
    }
}
