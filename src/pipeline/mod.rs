//! 章节批量上传管道
//!
//! 注册元数据 → 上传免费章节 → 上传 VIP 章节，
//! 通过事件通道报告状态与进度，支持取消。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

pub mod progress;


pub use progress::{PipelineEvent, ProgressTracker};

use crate::api::{ApiError, ChapterBackend, ChapterMeta, ObjectUpload, Partition, UploadTarget};
use crate::cancel::CancelSignal;
use crate::compress::compress;
use crate::parser::{encoding, ContentKind, ParsedChapter};
use crate::registrar::{register_in_batches, RegistrationError, DEFAULT_BATCH_SIZE};
use crate::upload_queue::{upload_all, AggregateUploadError, UploadError, UploadItemError, DEFAULT_CONCURRENCY};

/// 管道状态
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    RegisteringMetadata,
    UploadingFree,
    UploadingRestricted,
    Completed,
    /// 失败（包含错误信息）
    Failed(String),
    Cancelled,
}

impl PipelineState {
    /// 终止状态之后不再发生任何转换
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Completed | PipelineState::Failed(_) | PipelineState::Cancelled
        )
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("上传已取消")]
    Aborted,
    #[error(transparent)]
    Registration(RegistrationError),
    #[error("获取 {partition} 上传凭证失败: {source}")]
    Credential {
        partition: Partition,
        #[source]
        source: ApiError,
    },
    #[error("{partition} 章节上传失败: {source}")]
    Upload {
        partition: Partition,
        #[source]
        source: AggregateUploadError,
    },
}

impl PipelineError {
    /// 是否为用户取消（界面显示“已取消”而不是“失败”）
    pub fn is_aborted(&self) -> bool {
        matches!(self, PipelineError::Aborted)
    }
}

impl From<RegistrationError> for PipelineError {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::Aborted => PipelineError::Aborted,
            other => PipelineError::Registration(other),
        }
    }
}

/// 上传会话
///
/// 对应一次上传弹窗的表单状态：选中的章节、当前状态和进度。
/// 管道运行时取走章节，结束后（无论成功、失败或取消）章节列表为空。
#[derive(Debug)]
pub struct UploadSession {
    pub book_slug: String,
    pub chapters: Vec<ParsedChapter>,
    pub state: PipelineState,
    pub uploaded: usize,
    pub total_files: usize,
}

impl UploadSession {
    pub fn new(book_slug: impl Into<String>, chapters: Vec<ParsedChapter>) -> Self {
        let total_files = chapters.len();
        Self {
            book_slug: book_slug.into(),
            chapters,
            state: PipelineState::Idle,
            uploaded: 0,
            total_files,
        }
    }

    /// 进度百分比
    pub fn percent(&self) -> u8 {
        progress::percent(self.uploaded, self.total_files)
    }
}

/// 上传完成报告（onUploaded 回调的内容）
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub book_slug: String,
    pub total_files: usize,
    pub uploaded: usize,
    pub free_chapters: usize,
    pub restricted_chapters: usize,
    pub registered_batches: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// 管道参数
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

pub struct ChapterUploadPipeline {
    backend: Arc<dyn ChapterBackend>,
    options: PipelineOptions,
    events: Option<UnboundedSender<PipelineEvent>>,
}

impl ChapterUploadPipeline {
    pub fn new(backend: Arc<dyn ChapterBackend>, options: PipelineOptions) -> Self {
        Self {
            backend,
            options,
            events: None,
        }
    }

    /// 订阅状态与进度事件
    pub fn with_events(mut self, events: UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// 运行一次完整上传
    ///
    /// # 参数
    /// - `session`: 上传会话，运行期间更新其状态和进度
    /// - `cancel`: 本次运行的取消信号
    ///
    /// # 返回
    /// 成功返回上传报告；失败或取消时会话停在 `Failed` / `Cancelled`
    pub async fn run(
        &self,
        session: &mut UploadSession,
        cancel: &CancelSignal,
    ) -> Result<UploadReport, PipelineError> {
        if session.state != PipelineState::Idle {
            tracing::warn!(state = ?session.state, "会话不在 Idle 状态，重新开始");
            session.state = PipelineState::Idle;
        }

        let started_at = Utc::now();
        let chapters = std::mem::take(&mut session.chapters);
        session.total_files = chapters.len();
        session.uploaded = 0;

        let progress = ProgressTracker::new(chapters.len(), self.events.clone());
        let result = self.execute(session, chapters, &progress, cancel).await;
        session.uploaded = progress.uploaded();

        match result {
            Ok((free_chapters, restricted_chapters, registered_batches)) => {
                self.transition(session, PipelineState::Completed);
                let report = UploadReport {
                    book_slug: session.book_slug.clone(),
                    total_files: session.total_files,
                    uploaded: session.uploaded,
                    free_chapters,
                    restricted_chapters,
                    registered_batches,
                    started_at,
                    finished_at: Utc::now(),
                };
                tracing::info!(
                    book = %report.book_slug,
                    uploaded = report.uploaded,
                    free = free_chapters,
                    vip = restricted_chapters,
                    "章节上传完成"
                );
                Ok(report)
            }
            Err(e) if e.is_aborted() => {
                tracing::warn!(book = %session.book_slug, uploaded = session.uploaded, "章节上传已取消");
                self.transition(session, PipelineState::Cancelled);
                Err(e)
            }
            Err(e) => {
                tracing::error!(book = %session.book_slug, uploaded = session.uploaded, error = %e, "章节上传失败");
                self.transition(session, PipelineState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// 按阶段执行，返回 (免费章节数, VIP 章节数, 注册批次数)
    async fn execute(
        &self,
        session: &mut UploadSession,
        chapters: Vec<ParsedChapter>,
        progress: &ProgressTracker,
        cancel: &CancelSignal,
    ) -> Result<(usize, usize, usize), PipelineError> {
        let book_slug = session.book_slug.clone();

        self.transition(session, PipelineState::RegisteringMetadata);
        let metas: Vec<ChapterMeta> = chapters
            .iter()
            .map(|c| ChapterMeta {
                chapter_number: c.chapter_number,
                title: c.title.clone(),
            })
            .collect();
        let batches = register_in_batches(
            self.backend.as_ref(),
            &book_slug,
            &metas,
            self.options.batch_size,
            cancel,
        )
        .await?;

        let (free, restricted): (Vec<_>, Vec<_>) = chapters
            .into_iter()
            .partition(|c| Partition::of(c.chapter_number) == Partition::Free);
        let (free_count, restricted_count) = (free.len(), restricted.len());

        if !free.is_empty() {
            self.transition(session, PipelineState::UploadingFree);
            self.upload_partition(&book_slug, Partition::Free, free, progress, cancel)
                .await?;
        }

        if !restricted.is_empty() {
            self.transition(session, PipelineState::UploadingRestricted);
            self.upload_partition(&book_slug, Partition::Restricted, restricted, progress, cancel)
                .await?;
        }

        Ok((free_count, restricted_count, batches))
    }

    /// 上传一个分区：获取一次凭证，整个分区共用
    async fn upload_partition(
        &self,
        book_slug: &str,
        partition: Partition,
        chapters: Vec<ParsedChapter>,
        progress: &ProgressTracker,
        cancel: &CancelSignal,
    ) -> Result<(), PipelineError> {
        let target = match cancel.run(self.backend.upload_target(book_slug, partition)).await {
            None => return Err(PipelineError::Aborted),
            Some(Err(source)) => return Err(PipelineError::Credential { partition, source }),
            Some(Ok(target)) => target,
        };
        tracing::info!(book = book_slug, %partition, count = chapters.len(), "开始上传分区");

        let target = &target;
        upload_all(
            chapters,
            self.options.concurrency,
            cancel,
            move |chapter| self.upload_chapter(book_slug, partition, target, chapter, cancel),
            |chapter_number| progress.item_done(chapter_number),
        )
        .await
        .map_err(|e| match e {
            UploadError::Aborted => PipelineError::Aborted,
            UploadError::Aggregate(source) => PipelineError::Upload { partition, source },
        })
    }

    /// 单个章节：读取 → 压缩 → 上传，按顺序执行
    async fn upload_chapter(
        &self,
        book_slug: &str,
        partition: Partition,
        target: &UploadTarget,
        chapter: ParsedChapter,
        cancel: &CancelSignal,
    ) -> Result<u32, UploadItemError> {
        let body = match cancel.run(read_payload(&chapter)).await {
            None => return Err(UploadItemError::Aborted),
            Some(Err(source)) => {
                return Err(UploadItemError::Read {
                    file: chapter.file_name,
                    source,
                })
            }
            Some(Ok(body)) => body,
        };

        let key = partition.object_key(book_slug, &chapter.file_name);
        let object = ObjectUpload {
            fields: target.form_fields(&key, partition),
            file_name: chapter.file_name.clone(),
            content_type: chapter.kind.content_type(),
            body,
        };

        match cancel.run(self.backend.upload_object(target, object)).await {
            None => Err(UploadItemError::Aborted),
            Some(Err(source)) => Err(UploadItemError::Api {
                file: chapter.file_name,
                source,
            }),
            Some(Ok(())) => Ok(chapter.chapter_number),
        }
    }

    fn transition(&self, session: &mut UploadSession, next: PipelineState) {
        if session.state.is_terminal() {
            return;
        }
        tracing::debug!(from = ?session.state, to = ?next, "管道状态转换");
        session.state = next.clone();
        if let Some(events) = &self.events {
            let _ = events.send(PipelineEvent::StateChanged { state: next });
        }
    }
}

/// 读取上传内容：文本解码后压缩，音频原样上传
async fn read_payload(chapter: &ParsedChapter) -> std::io::Result<Vec<u8>> {
    let bytes = tokio::fs::read(&chapter.path).await?;
    match chapter.kind {
        ContentKind::Text => compress(&encoding::decode_text(&bytes)),
        ContentKind::Audio => Ok(bytes),
    }
}
