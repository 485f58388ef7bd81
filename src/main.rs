//! chapter-ingest CLI：批量上传书籍章节。

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tokio::sync::mpsc::unbounded_channel;

use chapter_ingest_lib::pipeline::progress::percent;
use chapter_ingest_lib::{
    expand_selection, parse_chapter_files, CancelSignal, ChapterUploadPipeline, ContentKind,
    HttpChapterApi, IngestConfig, Partition, PipelineEvent, UploadSession,
};

#[derive(Parser)]
#[command(name = "chapter-ingest", version, about = "Ngọc Tiêu Các 章节批量上传工具")]
struct Cli {
    /// 配置文件（TOML）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 只解析文件，列出章节号、标题和分区
    Parse {
        /// 章节文件或目录
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// 音频章节（chuong-<N>.opus）
        #[arg(long)]
        audio: bool,

        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },

    /// 注册章节并上传内容
    Upload {
        /// 书籍 slug
        #[arg(long)]
        book: String,

        /// 章节文件或目录
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// 音频章节（chuong-<N>.opus）
        #[arg(long)]
        audio: bool,

        /// 同时进行的上传数（覆盖配置文件）
        #[arg(long)]
        concurrency: Option<usize>,

        /// 每批注册的章节数（覆盖配置文件）
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

fn content_kind(audio: bool) -> ContentKind {
    if audio {
        ContentKind::Audio
    } else {
        ContentKind::Text
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { paths, audio, json } => {
            let files = expand_selection(&paths);
            let chapters = parse_chapter_files(&files, content_kind(audio)).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&chapters).into_diagnostic()?);
            } else {
                for chapter in &chapters {
                    println!(
                        "{:>5}  {:<4}  {:<24}  {}",
                        chapter.chapter_number,
                        Partition::of(chapter.chapter_number),
                        chapter.file_name,
                        chapter.title
                    );
                }
                println!("共 {} 个章节（已选择 {} 个文件）", chapters.len(), files.len());
            }
        }

        Commands::Upload {
            book,
            paths,
            audio,
            concurrency,
            batch_size,
        } => {
            let mut config = IngestConfig::load(cli.config.as_deref()).into_diagnostic()?;
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            config.validate().into_diagnostic()?;

            let files = expand_selection(&paths);
            let chapters = parse_chapter_files(&files, content_kind(audio)).await;
            if chapters.is_empty() {
                miette::bail!("没有找到符合 chuong-<N> 格式的章节文件");
            }

            let api = HttpChapterApi::new(&config.api_base_url, config.api_token.clone()).into_diagnostic()?;
            let (events, mut receiver) = unbounded_channel();
            let pipeline = ChapterUploadPipeline::new(Arc::new(api), config.pipeline_options()).with_events(events);

            let cancel = CancelSignal::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let printer = tokio::spawn(async move {
                while let Some(event) = receiver.recv().await {
                    match event {
                        PipelineEvent::StateChanged { state } => println!("状态: {:?}", state),
                        PipelineEvent::Progress { uploaded, total, .. } => {
                            println!("[{:>3}%] {}/{}", percent(uploaded, total), uploaded, total)
                        }
                    }
                }
            });

            let mut session = UploadSession::new(book, chapters);
            let result = pipeline.run(&mut session, &cancel).await;
            // 关闭事件通道，等待输出结束
            drop(pipeline);
            let _ = printer.await;

            match result {
                Ok(report) => {
                    println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
                }
                Err(e) if e.is_aborted() => {
                    eprintln!("已取消（已上传 {}/{}）", session.uploaded, session.total_files);
                    std::process::exit(130);
                }
                Err(e) => return Err(e).into_diagnostic(),
            }
        }
    }

    Ok(())
}
