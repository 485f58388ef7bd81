use std::fs;
use std::path::PathBuf;

pub mod api;
pub mod cancel;
pub mod compress;
pub mod config;
pub mod parser;
pub mod pipeline;
pub mod registrar;
pub mod upload_queue;

// 重新导出主要类型
pub use api::{ChapterBackend, HttpChapterApi, Partition, UploadTarget, FREE_CHAPTER_LIMIT};
pub use cancel::CancelSignal;
pub use config::IngestConfig;
pub use parser::{parse_chapter_files, ContentKind, ParsedChapter};
pub use pipeline::{
    ChapterUploadPipeline, PipelineError, PipelineEvent, PipelineOptions, PipelineState, UploadReport,
    UploadSession,
};

/// 展开用户选择
///
/// 文件原样保留；目录展开为其中的文件（不递归）。
/// 无法读取的目录只记录警告，与文件解析失败一样不中断整批。
pub fn expand_selection(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }

        match fs::read_dir(input) {
            Ok(entries) => {
                let mut dir_files: Vec<PathBuf> = entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .filter(|path| path.is_file())
                    .collect();
                dir_files.sort();
                files.extend(dir_files);
            }
            Err(e) => {
                tracing::warn!(path = %input.display(), error = %e, "读取目录失败");
            }
        }
    }

    files
}
