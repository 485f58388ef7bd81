use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use futures::future::join_all;
use thiserror::Error;

use crate::api::ApiError;
use crate::cancel::CancelSignal;

/// 默认并发上传数
pub const DEFAULT_CONCURRENCY: usize = 5;

/// 单个文件的上传错误
#[derive(Error, Debug)]
pub enum UploadItemError {
    #[error("读取文件失败 {file}: {source}")]
    Read {
        file: String,
        #[source]
        source: std::io::Error,
    },
    #[error("上传失败 {file}: {source}")]
    Api {
        file: String,
        #[source]
        source: ApiError,
    },
    #[error("已取消")]
    Aborted,
}

/// 一批上传中所有失败的文件
#[derive(Error, Debug)]
#[error("{} 个文件上传失败，首个错误: {}", .failures.len(), first_failure(.failures))]
pub struct AggregateUploadError {
    pub failures: Vec<UploadItemError>,
}

fn first_failure(failures: &[UploadItemError]) -> String {
    failures
        .first()
        .map(|e| e.to_string())
        .unwrap_or_default()
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("上传已取消")]
    Aborted,
    #[error(transparent)]
    Aggregate(#[from] AggregateUploadError),
}

/// 上传队列
///
/// 所有 worker 共享同一个待处理队列，出队是原子的，
/// 同一个任务不会被两个 worker 取走。
pub struct UploadQueue<T> {
    /// 待处理任务队列
    tasks: Mutex<VecDeque<T>>,
    /// 最大并发数
    max_concurrent: usize,
}

impl<T> UploadQueue<T> {
    /// # 参数
    /// - `items`: 待上传的任务
    /// - `max_concurrent`: 最大并发数，0 按 1 处理
    pub fn new(items: impl IntoIterator<Item = T>, max_concurrent: usize) -> Self {
        Self {
            tasks: Mutex::new(items.into_iter().collect()),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// 取出下一个任务
    pub fn dequeue(&self) -> Option<T> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// 队列中剩余的任务数量
    pub fn queue_size(&self) -> usize {
        self.tasks
            .lock()
            .map(|t| t.len())
            .unwrap_or_else(|e| e.into_inner().len())
    }

    /// 启动 `max_concurrent` 个 worker 处理整个队列
    ///
    /// 每个 worker 循环：检查取消 → 出队 → 等待 `worker(item)` 完成 → 成功则调用一次 `on_item_done`。
    /// 取消、任务自行中止或任意任务失败后不再派发新任务，已派发的任务自行结束。
    ///
    /// # 返回
    /// - `Ok(())`: 队列中每个任务都已成功处理
    /// - `Err(UploadError::Aborted)`: 收到取消信号，或有任务返回 `UploadItemError::Aborted`
    /// - `Err(UploadError::Aggregate)`: 至少一个任务失败
    pub async fn run<F, Fut, O, D>(
        self,
        cancel: &CancelSignal,
        worker: F,
        on_item_done: D,
    ) -> Result<(), UploadError>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<O, UploadItemError>>,
        D: Fn(O),
    {
        let failures = Mutex::new(Vec::new());
        let failed = AtomicBool::new(false);
        let aborted = AtomicBool::new(false);

        let queue = &self;
        let worker = &worker;
        let on_item_done = &on_item_done;
        let failures_ref = &failures;
        let failed_ref = &failed;
        let aborted_ref = &aborted;

        let workers = (0..self.max_concurrent).map(|slot| async move {
            loop {
                if cancel.is_cancelled()
                    || failed_ref.load(Ordering::SeqCst)
                    || aborted_ref.load(Ordering::SeqCst)
                {
                    break;
                }
                let Some(item) = queue.dequeue() else {
                    break;
                };

                match worker(item).await {
                    Ok(output) => on_item_done(output),
                    Err(UploadItemError::Aborted) => {
                        tracing::debug!(slot, "上传任务已中止");
                        aborted_ref.store(true, Ordering::SeqCst);
                        break;
                    }
                    Err(e) => {
                        tracing::error!(slot, error = %e, "上传任务失败");
                        failed_ref.store(true, Ordering::SeqCst);
                        failures_ref
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(e);
                        break;
                    }
                }
            }
        });
        join_all(workers).await;

        if cancel.is_cancelled() || aborted.load(Ordering::SeqCst) {
            return Err(UploadError::Aborted);
        }

        let failures = failures.into_inner().unwrap_or_else(PoisonError::into_inner);
        if !failures.is_empty() {
            return Err(AggregateUploadError { failures }.into());
        }

        Ok(())
    }
}

/// 以固定并发上限上传所有任务
pub async fn upload_all<T, F, Fut, O, D>(
    items: Vec<T>,
    concurrency: usize,
    cancel: &CancelSignal,
    worker: F,
    on_item_done: D,
) -> Result<(), UploadError>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<O, UploadItemError>>,
    D: Fn(O),
{
    UploadQueue::new(items, concurrency)
        .run(cancel, worker, on_item_done)
        .await
}
