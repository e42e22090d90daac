use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 队列消息信封
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub job: AnalysisJob,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn analysis(job: AnalysisJob) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job,
            timestamp: Utc::now(),
        }
    }
}

/// 图片解析作业
///
/// `attempt` 从 1 开始计数，每次重新入队时加一。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisJob {
    pub task_id: String,
    pub user_id: String,
    pub school_id: String,
    #[serde(with = "base64_bytes")]
    pub image: Vec<u8>,
    pub attempt: i32,
    pub enqueued_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn first_attempt(
        task_id: impl Into<String>,
        user_id: impl Into<String>,
        school_id: impl Into<String>,
        image: Vec<u8>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            user_id: user_id.into(),
            school_id: school_id.into(),
            image,
            attempt: 1,
            enqueued_at: Utc::now(),
        }
    }

    /// 下一次尝试的作业
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            enqueued_at: Utc::now(),
            ..self.clone()
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_attempt_keeps_payload() {
        let job = AnalysisJob::first_attempt("t1", "u1", "s1", vec![0xFF, 0xD8, 0xFF]);
        let next = job.next_attempt();

        assert_eq!(job.attempt, 1);
        assert_eq!(next.attempt, 2);
        assert_eq!(next.task_id, "t1");
        assert_eq!(next.image, job.image);
    }

    #[test]
    fn test_image_is_base64_on_the_wire() {
        let message = Message::analysis(AnalysisJob::first_attempt("t1", "u1", "s1", b"abc".to_vec()));
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["job"]["image"], "YWJj");

        let decoded: Message = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.job.image, b"abc".to_vec());
    }
}
