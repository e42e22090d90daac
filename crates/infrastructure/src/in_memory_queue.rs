use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use tutor_core::{models::Message, traits::MessageQueue, TutorError, TutorResult};

/// 内存作业队列实现
///
/// 使用 Tokio channels 实现，适用于单进程部署和测试。
/// 延迟投递通过后台 sleep 后再发送实现，进程退出时未到期的消息会丢失。
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    /// 队列存储：队列名 -> 通道
    queues: Arc<RwLock<HashMap<String, QueueChannels>>>,
}

#[derive(Debug, Clone)]
struct QueueChannels {
    sender: mpsc::UnboundedSender<Message>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Message>>>,
    /// 队列中（含延迟中）的消息数量
    size: Arc<AtomicU32>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取或创建队列通道
    async fn channels(&self, queue_name: &str) -> QueueChannels {
        if let Some(channels) = self.queues.read().await.get(queue_name) {
            return channels.clone();
        }

        let mut queues = self.queues.write().await;
        queues
            .entry(queue_name.to_string())
            .or_insert_with(|| {
                info!("Created queue '{}'", queue_name);
                let (sender, receiver) = mpsc::unbounded_channel();
                QueueChannels {
                    sender,
                    receiver: Arc::new(Mutex::new(receiver)),
                    size: Arc::new(AtomicU32::new(0)),
                }
            })
            .clone()
    }
}

#[async_trait]
impl MessageQueue for InMemoryJobQueue {
    async fn publish_message(&self, queue: &str, message: &Message) -> TutorResult<()> {
        let channels = self.channels(queue).await;

        channels.sender.send(message.clone()).map_err(|e| {
            error!("Failed to send message to queue '{}': {}", queue, e);
            TutorError::MessageQueue(format!("Failed to send message to queue '{queue}': {e}"))
        })?;
        channels.size.fetch_add(1, Ordering::Relaxed);

        debug!("Published message {} to queue '{}'", message.id, queue);
        Ok(())
    }

    async fn publish_after(
        &self,
        queue: &str,
        message: &Message,
        delay: Duration,
    ) -> TutorResult<()> {
        let channels = self.channels(queue).await;
        channels.size.fetch_add(1, Ordering::Relaxed);

        let message = message.clone();
        let queue_name = queue.to_string();
        debug!(
            "Scheduled message {} for queue '{}' in {:?}",
            message.id, queue_name, delay
        );

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = channels.sender.send(message) {
                channels.size.fetch_sub(1, Ordering::Relaxed);
                warn!("Delayed delivery to queue '{}' failed: {}", queue_name, e);
            }
        });

        Ok(())
    }

    async fn consume_messages(&self, queue: &str, max_messages: usize) -> TutorResult<Vec<Message>> {
        let channels = self.channels(queue).await;
        let mut messages = Vec::new();

        {
            let mut rx = channels.receiver.lock().await;
            while messages.len() < max_messages {
                match rx.try_recv() {
                    Ok(message) => messages.push(message),
                    Err(_) => break,
                }
            }
        }

        if !messages.is_empty() {
            channels
                .size
                .fetch_sub(messages.len() as u32, Ordering::Relaxed);
            debug!("Consumed {} messages from queue '{}'", messages.len(), queue);
        }

        Ok(messages)
    }

    async fn get_queue_size(&self, queue: &str) -> TutorResult<u32> {
        let channels = self.channels(queue).await;
        Ok(channels.size.load(Ordering::Relaxed))
    }
}
