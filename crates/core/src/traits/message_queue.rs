use std::time::Duration;

use async_trait::async_trait;

use crate::{errors::TutorResult, models::Message};

/// 作业队列抽象接口
///
/// 至少一次投递：同一条消息可能被重复消费，消费方必须幂等。
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// 发布消息到指定队列
    async fn publish_message(&self, queue: &str, message: &Message) -> TutorResult<()>;

    /// 延迟 `delay` 之后再投递
    async fn publish_after(&self, queue: &str, message: &Message, delay: Duration)
        -> TutorResult<()>;

    /// 非阻塞地取出至多 `max_messages` 条消息
    async fn consume_messages(&self, queue: &str, max_messages: usize) -> TutorResult<Vec<Message>>;

    /// 获取队列中的消息数量
    async fn get_queue_size(&self, queue: &str) -> TutorResult<u32>;
}
