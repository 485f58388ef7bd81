use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc::UnboundedSender;

use super::PipelineState;

/// 管道事件
///
/// 前端（或命令行）通过通道接收，用于刷新状态和进度条
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    StateChanged { state: PipelineState },
    Progress { uploaded: usize, total: usize, chapter_number: Option<u32> },
}

/// 进度计数器
///
/// `uploaded` 只在单个文件上传成功后递增，
/// 只有全部成功时才会达到 `total`。
pub struct ProgressTracker {
    uploaded: AtomicUsize,
    total: usize,
    events: Option<UnboundedSender<PipelineEvent>>,
}

impl ProgressTracker {
    pub fn new(total: usize, events: Option<UnboundedSender<PipelineEvent>>) -> Self {
        let tracker = Self {
            uploaded: AtomicUsize::new(0),
            total,
            events,
        };
        tracker.emit(0, None);
        tracker
    }

    /// 一个章节上传成功
    pub fn item_done(&self, chapter_number: u32) {
        let uploaded = self.uploaded.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(chapter_number, uploaded, total = self.total, "章节上传成功");
        self.emit(uploaded, Some(chapter_number));
    }

    pub fn uploaded(&self) -> usize {
        self.uploaded.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// 进度百分比（0-100）
    pub fn percent(&self) -> u8 {
        percent(self.uploaded(), self.total)
    }

    fn emit(&self, uploaded: usize, chapter_number: Option<u32>) {
        if let Some(events) = &self.events {
            // 接收端已关闭时忽略
            let _ = events.send(PipelineEvent::Progress {
                uploaded,
                total: self.total,
                chapter_number,
            });
        }
    }
}

/// 进度百分比，向下取整；total 为 0 视为完成
pub fn percent(uploaded: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((uploaded.min(total) * 100) / total) as u8
}
