use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::{ErrContext, Result};

/// One scheduled execution of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub job_id: String,
    pub code: String,
    pub language: String,
}

/// One scheduled construction or removal of a compiler image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum BuildPayload {
    Build {
        compiler_id: String,
    },
    Cleanup {
        compiler_id: String,
        image_tag: String,
    },
}

/// Two named FIFO queues over Redis lists.
///
/// Producers LPUSH, consumers RPOP; delivery is best-effort (a consumer crash
/// mid-handler loses the in-flight record, which the worker-start
/// reconciliation tolerates). The connection manager reconnects on its own,
/// so a broker value can be cloned freely into services.
#[derive(Clone)]
pub struct Broker {
    conn: ConnectionManager,
    job_queue: String,
    build_queue: String,
}

impl Broker {
    pub async fn connect(url: &str, job_queue: &str, build_queue: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid redis url")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("failed to connect to redis")?;

        Ok(Self {
            conn,
            job_queue: job_queue.to_string(),
            build_queue: build_queue.to_string(),
        })
    }

    pub async fn push_job(&self, payload: &JobPayload) -> Result<()> {
        self.push(&self.job_queue, serde_json::to_string(payload)?)
            .await
    }

    pub async fn push_build(&self, payload: &BuildPayload) -> Result<()> {
        self.push(&self.build_queue, serde_json::to_string(payload)?)
            .await
    }

    /// Non-blocking: returns the oldest job payload, or `None` when empty.
    pub async fn pop_job(&self) -> Result<Option<JobPayload>> {
        match self.pop(&self.job_queue).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Non-blocking: returns the oldest build payload, or `None` when empty.
    pub async fn pop_build(&self) -> Result<Option<BuildPayload>> {
        match self.pop(&self.build_queue).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn push(&self, queue: &str, raw: String) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(queue, raw).await?;
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.rpop(queue, None).await?;
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // The queue payloads are a wire contract shared with any other producer
    // or consumer, so their exact JSON shape is pinned here.

    #[test]
    fn job_payload_wire_shape() {
        let payload: JobPayload = serde_json::from_str(
            r#"{"job_id": "b1e7e1a2-0000-0000-0000-000000000000", "code": "print(2+2)", "language": "python-3.12"}"#,
        )
        .unwrap();
        assert_eq!(payload.language, "python-3.12");
        assert_eq!(payload.code, "print(2+2)");
    }

    #[test]
    fn build_payload_is_tagged_by_action() {
        let build: BuildPayload =
            serde_json::from_str(r#"{"action": "build", "compiler_id": "go-1.22"}"#).unwrap();
        assert_eq!(
            build,
            BuildPayload::Build {
                compiler_id: "go-1.22".into()
            }
        );

        let cleanup: BuildPayload = serde_json::from_str(
            r#"{"action": "cleanup", "compiler_id": "go-1.22", "image_tag": "yantra-go-1.22:latest"}"#,
        )
        .unwrap();
        assert_eq!(
            cleanup,
            BuildPayload::Cleanup {
                compiler_id: "go-1.22".into(),
                image_tag: "yantra-go-1.22:latest".into()
            }
        );

        let raw = serde_json::to_value(&BuildPayload::Build {
            compiler_id: "go-1.22".into(),
        })
        .unwrap();
        assert_eq!(raw["action"], "build");
    }
}
