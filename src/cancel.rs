use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// 取消信号
///
/// 每次管道运行创建一个，克隆后共享给所有 worker。
/// 触发后：队列不再派发新任务，正在进行的请求收到尽力而为的中止。
#[derive(Clone, Debug)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// 触发取消；重复调用无副作用
    pub fn cancel(&self) {
        if !self.sender.send_replace(true) {
            tracing::info!("收到取消请求");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// 等待取消信号
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // sender 由 self 持有，wait_for 不会因通道关闭而返回错误
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// 让一个 future 与取消信号竞争
    ///
    /// 取消先到时丢弃该 future（对 HTTP 请求即中止连接），返回 None
    pub async fn run<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = future => Some(output),
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
