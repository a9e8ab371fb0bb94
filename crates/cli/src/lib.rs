use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_engine::{default_engine, Document, EngineConfig, OpenSource};
use pdf_viewer_core::{DocumentLoader, LoaderOptions};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use viewer_core::{LoadPolicy, PageNavigator, ScrollView, ViewerConfig, ViewportState};

#[derive(Debug, Parser)]
#[command(name = "pdf-viewer")]
#[command(about = "PDF viewer demo harness")]
pub struct Cli {
    /// Viewer configuration file (TOML). Without it, PDF_VIEWER_* variables apply.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print page count and page sizes as JSON.
    Info {
        #[arg(value_name = "FILE")]
        file: String,
    },
    /// Render every page to a full PNG and a preview JPEG.
    Render {
        #[arg(value_name = "FILE")]
        file: String,
        #[arg(long)]
        scale: Option<f32>,
        #[arg(long)]
        preview_quality: Option<u8>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Keep going when a page fails to render.
        #[arg(long)]
        per_page: bool,
    },
    /// Report the current page (1-based) at a scroll offset.
    CurrentPage {
        #[arg(value_name = "FILE")]
        file: String,
        #[arg(long)]
        offset: f32,
        #[arg(long, default_value_t = 800.0)]
        viewport_height: f32,
        #[arg(long, default_value_t = 16.0)]
        spacing: f32,
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct RenderOutput {
    path: String,
    page_count: u32,
    scale: f32,
    preview_quality: u8,
    pages: Vec<RenderedPageOutput>,
    failed_pages: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct RenderedPageOutput {
    page: u32,
    width: u32,
    height: u32,
    full: Option<PathBuf>,
    preview: Option<PathBuf>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct CurrentPageOutput {
    offset: f32,
    page_count: u32,
    current_page: Option<u32>,
    visible: Vec<VisibleOutput>,
}

#[derive(Debug, Serialize)]
struct VisibleOutput {
    page: u32,
    fraction: f32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Render { file, scale, preview_quality, out_dir, per_page } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(scale) = scale {
                config = config.with_scale(scale);
            }
            if let Some(quality) = preview_quality {
                config = config.with_preview_quality(quality);
            }
            if per_page {
                config = config.with_load_policy(LoadPolicy::PerPage);
            }
            config.validate()?;
            run_render(&file, &config, &out_dir)
        }
        Commands::CurrentPage { file, offset, viewport_height, spacing, threshold, scale } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(threshold) = threshold {
                config = config.with_threshold(threshold);
            }
            run_current_page(&file, &config, offset, viewport_height, spacing, scale)
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ViewerConfig> {
    let config = match path {
        Some(path) => ViewerConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => ViewerConfig::from_env().context("invalid PDF_VIEWER_* environment")?,
    };
    log::debug!("viewer config: {config:?}");
    Ok(config)
}

fn open_document(file: &str) -> Result<Document> {
    let source = parse_source(file)?;
    let engine = default_engine(EngineConfig::default())?;
    Document::open(engine, &source).context("failed to open PDF")
}

fn parse_source(file: &str) -> Result<OpenSource> {
    let source: OpenSource = file.parse()?;
    if let OpenSource::Path(path) = &source {
        ensure_pdf_exists(path)?;
    }
    Ok(source)
}

fn run_info(file: &str) -> Result<()> {
    let document = open_document(file)?;

    let pages = (0..document.page_count())
        .map(|index| {
            let size = document.page_size(index)?;
            Ok(PageSizeOutput { width: size.width_pt, height: size.height_pt })
        })
        .collect::<Result<Vec<_>>>()?;

    let payload = InfoOutput { path: file.to_owned(), page_count: document.page_count(), pages };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_render(file: &str, config: &ViewerConfig, out_dir: &Path) -> Result<()> {
    let source = parse_source(file)?;
    let engine = default_engine(EngineConfig::default())?;
    let loader = DocumentLoader::new(engine, LoaderOptions::from_config(config));

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let summary = runtime
        .block_on(loader.load(source))
        .with_context(|| format!("failed to render {file}"))?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let state = loader.state();
    let mut pages = Vec::with_capacity(summary.page_count as usize);
    for index in 0..summary.page_count as usize {
        let number = index + 1;
        let mut output = RenderedPageOutput {
            page: number as u32,
            width: 0,
            height: 0,
            full: None,
            preview: None,
            error: state.page_errors.get(index).cloned().flatten(),
        };

        if let Some(Some(full)) = state.full_images.get(index) {
            let path = out_dir.join(format!("page-{number}.{}", full.encoding.extension()));
            write_image(&path, &full.data)?;
            output.width = full.width;
            output.height = full.height;
            output.full = Some(path);
        }
        if let Some(Some(preview)) = state.preview_images.get(index) {
            let path =
                out_dir.join(format!("page-{number}-preview.{}", preview.encoding.extension()));
            write_image(&path, &preview.data)?;
            output.preview = Some(path);
        }

        pages.push(output);
    }

    let payload = RenderOutput {
        path: file.to_owned(),
        page_count: summary.page_count,
        scale: config.scale,
        preview_quality: config.preview_quality,
        pages,
        failed_pages: summary.failed_pages.iter().map(|index| index + 1).collect(),
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_current_page(
    file: &str,
    config: &ViewerConfig,
    offset: f32,
    viewport_height: f32,
    spacing: f32,
    scale: f32,
) -> Result<()> {
    let document = open_document(file)?;

    let heights = (0..document.page_count())
        .map(|index| Ok(document.viewport(index, scale)?.height as f32))
        .collect::<Result<Vec<_>>>()?;
    let view = ScrollView::new(ViewportState::new(heights, spacing, viewport_height));

    let mut navigator = PageNavigator::new(view, config)?;
    navigator.document_ready(document.page_count());
    navigator.host_mut().scroll_immediate(offset);
    let current_page = navigator.sync_visibility();

    let host = navigator.host();
    let visible = host
        .samples()
        .into_iter()
        .filter(|sample| sample.fraction > 0.0)
        .map(|sample| VisibleOutput { page: sample.page_index + 1, fraction: sample.fraction })
        .collect();

    let payload = CurrentPageOutput {
        offset: host.scroll_offset(),
        page_count: document.page_count(),
        current_page: current_page.map(|index| index + 1),
        visible,
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn write_image(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data).with_context(|| format!("failed to write image to {}", path.display()))
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
