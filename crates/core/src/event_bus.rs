//! 派单事件总线
//!
//! 纯扇出，不含业务逻辑。每个订阅者各自持有一条广播接收端，
//! 投递语义为每事件每订阅者至多一次：不回放、不持久化，
//! 需要可靠落地的消费方自行订阅后持久化。

use tokio::sync::broadcast;
use tracing::{debug, warn};

use dispatch_domain::DispatchEvent;

pub type EventPredicate = Box<dyn Fn(&DispatchEvent) -> bool + Send + Sync>;

pub struct DispatchEventBus {
    sender: broadcast::Sender<DispatchEvent>,
}

impl DispatchEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 投递给所有当前订阅者，没有订阅者时事件直接丢弃
    pub fn publish(&self, event: DispatchEvent) {
        debug!(
            event_type = event.event_type(),
            subscribers = self.sender.receiver_count(),
            "发布派单事件"
        );
        // 没有接收者不是错误
        let _ = self.sender.send(event);
    }

    /// 订阅全部事件
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            predicate: None,
        }
    }

    /// 按谓词过滤订阅，不匹配的事件在接收端被跳过
    pub fn subscribe_filtered<F>(&self, predicate: F) -> EventSubscription
    where
        F: Fn(&DispatchEvent) -> bool + Send + Sync + 'static,
    {
        EventSubscription {
            receiver: self.sender.subscribe(),
            predicate: Some(Box::new(predicate)),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for DispatchEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// 惰性事件流，drop 即取消订阅，对发布方无副作用
pub struct EventSubscription {
    receiver: broadcast::Receiver<DispatchEvent>,
    predicate: Option<EventPredicate>,
}

impl EventSubscription {
    /// 下一条匹配的事件；总线关闭后返回 None
    pub async fn recv(&mut self) -> Option<DispatchEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.predicate.as_ref().map(|p| p(&event)).unwrap_or(true) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // 至多一次投递：慢订阅者丢失积压事件后继续
                    warn!("订阅者滞后，丢失 {} 条事件", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
