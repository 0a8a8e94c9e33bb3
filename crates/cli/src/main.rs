use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use report_core::config::{
    bucket_from_env_value, concurrency_from_env_value, timeout_from_env_value,
    DEFAULT_PHOTO_FETCH_CONCURRENCY, DEFAULT_TEXT_GENERATION_CONCURRENCY,
};
use report_core::constants::{DEFAULT_CHECKLIST_BUCKET, DEFAULT_PHOTO_BUCKET};
use report_core::{
    ChecklistInstance, CoreConfig, DocumentAssembler, Examination, FieldMetadataCache,
    FileDataService, FsTemplateSource, HttpTextGenerator, PdftoppmRasterizer, UploadedFile,
};
use report_files::{BlobStore, FsBlobStore};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "report")]
#[command(about = "Expertise report assembly CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a report from an examination and a template document
    Render {
        /// Examination JSON
        #[arg(long)]
        examination: PathBuf,
        /// Report template (.docx)
        #[arg(long)]
        template: PathBuf,
        /// Output document
        #[arg(long)]
        out: PathBuf,
        /// Map screenshot for the expertiseMapScreenshot placeholder
        #[arg(long)]
        screenshot: Option<PathBuf>,
        /// Text generation endpoint; overrides REPORT_TEXTGEN_URL
        #[arg(long)]
        textgen_url: Option<String>,
    },
    /// Print the field labels and narrative of a template
    Labels {
        /// Template UUID
        template_id: Uuid,
    },
    /// Merge edited values and uploaded files into a checklist instance
    Merge {
        /// Checklist instance JSON
        #[arg(long)]
        instance: PathBuf,
        /// JSON object of edited top-level fields
        #[arg(long)]
        values: Option<PathBuf>,
        /// Uploaded file as KEY=PATH, e.g. kitchen__walls__photos=crack.jpg
        #[arg(long = "file", value_parser = parse_upload)]
        files: Vec<(String, PathBuf)>,
        /// Bearer token forwarded to the blob store
        #[arg(long, default_value = "")]
        token: String,
    },
    /// Remove a stored file from a checklist instance
    DeleteFile {
        /// Checklist instance JSON
        #[arg(long)]
        instance: PathBuf,
        /// Stored file name, including extension
        #[arg(long)]
        name: String,
        /// Bucket key the entry is listed under
        #[arg(long)]
        bucket: String,
    },
}

fn parse_upload(raw: &str) -> Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((key, path)) if !key.is_empty() && !path.is_empty() => {
            Ok((key.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected KEY=PATH, got '{}'", raw)),
    }
}

/// Runtime settings resolved once from the environment.
///
/// # Environment Variables
/// - `REPORT_TEMPLATE_DIR`: checklist template declarations (default: "templates")
/// - `REPORT_BLOB_ROOT`: root of the filesystem blob store (default: "blobs")
/// - `REPORT_CHECKLIST_BUCKET`, `REPORT_PHOTO_BUCKET`: bucket names
/// - `REPORT_PHOTO_FETCH_CONCURRENCY`: answer-photo fetch ceiling
/// - `REPORT_TEXTGEN_URL`: text generation endpoint (optional)
/// - `REPORT_TEXTGEN_CONCURRENCY`: parallel text generation calls per checklist (default: 5)
/// - `REPORT_EXTERNAL_TIMEOUT_SECS`: bound on external calls (default: 120)
struct Settings {
    config: Arc<CoreConfig>,
    blob_root: PathBuf,
    textgen_url: Option<String>,
}

impl Settings {
    fn from_env() -> anyhow::Result<Self> {
        let template_dir = std::env::var("REPORT_TEMPLATE_DIR").unwrap_or_else(|_| "templates".into());
        let blob_root = std::env::var("REPORT_BLOB_ROOT").unwrap_or_else(|_| "blobs".into());

        let config = CoreConfig::new(PathBuf::from(template_dir))?
            .with_buckets(
                bucket_from_env_value(
                    std::env::var("REPORT_CHECKLIST_BUCKET").ok(),
                    DEFAULT_CHECKLIST_BUCKET,
                ),
                bucket_from_env_value(std::env::var("REPORT_PHOTO_BUCKET").ok(), DEFAULT_PHOTO_BUCKET),
            )?
            .with_photo_fetch_concurrency(concurrency_from_env_value(
                std::env::var("REPORT_PHOTO_FETCH_CONCURRENCY").ok(),
                DEFAULT_PHOTO_FETCH_CONCURRENCY,
            )?)
            .with_text_generation_concurrency(concurrency_from_env_value(
                std::env::var("REPORT_TEXTGEN_CONCURRENCY").ok(),
                DEFAULT_TEXT_GENERATION_CONCURRENCY,
            )?)
            .with_external_call_timeout(timeout_from_env_value(
                std::env::var("REPORT_EXTERNAL_TIMEOUT_SECS").ok(),
            )?);

        Ok(Self {
            config: Arc::new(config),
            blob_root: PathBuf::from(blob_root),
            textgen_url: std::env::var("REPORT_TEXTGEN_URL")
                .ok()
                .filter(|u| !u.trim().is_empty()),
        })
    }

    fn cache(&self) -> anyhow::Result<Arc<FieldMetadataCache>> {
        let source = FsTemplateSource::new(self.config.template_dir());
        Ok(Arc::new(FieldMetadataCache::init(&source)?))
    }

    fn blobs(&self) -> anyhow::Result<Arc<dyn BlobStore>> {
        std::fs::create_dir_all(&self.blob_root)
            .with_context(|| format!("creating blob root {}", self.blob_root.display()))?;
        Ok(Arc::new(FsBlobStore::new(&self.blob_root)?))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn template_name(cache: &FieldMetadataCache, instance: &ChecklistInstance) -> anyhow::Result<String> {
    match cache.template_name(instance.template_id) {
        Some(name) => Ok(name.to_string()),
        None => bail!("unknown template {}", instance.template_id),
    }
}

/// Main entry point for the report CLI
///
/// Loads `.env`, installs logging (`RUST_LOG`, default `report=info`) and runs one command.
fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("report=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    match cli.command {
        Commands::Render {
            examination,
            template,
            out,
            screenshot,
            textgen_url,
        } => {
            let examination: Examination = read_json(&examination)?;
            let template = std::fs::read(&template)
                .with_context(|| format!("reading {}", template.display()))?;
            let screenshot = screenshot
                .map(|p| std::fs::read(&p).with_context(|| format!("reading {}", p.display())))
                .transpose()?;

            let mut assembler = DocumentAssembler::new(
                settings.cache()?,
                settings.blobs()?,
                Arc::new(PdftoppmRasterizer::default()),
                settings.config.clone(),
            )?;
            if let Some(url) = textgen_url.or_else(|| settings.textgen_url.clone()) {
                let generator =
                    HttpTextGenerator::new(url, settings.config.external_call_timeout())?;
                assembler = assembler.with_text_generator(Arc::new(generator));
            }

            let bytes = assembler.generate(&template, &examination, screenshot.as_deref())?;
            std::fs::write(&out, &bytes).with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote {} ({} bytes)", out.display(), bytes.len());
        }
        Commands::Labels { template_id } => {
            let cache = settings.cache()?;
            let Some(name) = cache.template_name(template_id) else {
                bail!("unknown template {}", template_id);
            };
            println!("{}", name);
            for (key, label) in cache.get_field_label_map(template_id) {
                println!("  {}: {}", key, label);
            }
            if let Some(text) = cache.get_type_text(template_id) {
                println!("type_text: {}", text);
            }
        }
        Commands::Merge {
            instance,
            values,
            files,
            token,
        } => {
            let cache = settings.cache()?;
            let mut checklist: ChecklistInstance = read_json(&instance)?;
            let values: Map<String, Value> = match values {
                Some(path) => read_json(&path)?,
                None => Map::new(),
            };
            let uploads = files
                .into_iter()
                .map(|(key, path)| -> anyhow::Result<UploadedFile> {
                    let bytes = std::fs::read(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    Ok(UploadedFile {
                        key,
                        file_name,
                        bytes,
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            let service = FileDataService::new(settings.blobs()?, settings.config.clone())?;
            let outcome = service.merge(
                &template_name(&cache, &checklist)?,
                &mut checklist,
                uploads,
                &token,
                values,
            )?;
            tracing::info!(
                "uploaded {}, skipped {} duplicates, restored {}",
                outcome.uploaded,
                outcome.duplicates_skipped,
                outcome.restored
            );
            println!("{}", serde_json::to_string_pretty(&checklist)?);
        }
        Commands::DeleteFile {
            instance,
            name,
            bucket,
        } => {
            let mut checklist: ChecklistInstance = read_json(&instance)?;
            let service = FileDataService::new(settings.blobs()?, settings.config.clone())?;
            if !service.delete_file(&mut checklist, &name, &bucket)? {
                eprintln!("No file named {} in bucket {}", name, bucket);
            }
            println!("{}", serde_json::to_string_pretty(&checklist)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upload() {
        assert_eq!(
            parse_upload("kitchen__walls__photos=crack.jpg").unwrap(),
            ("kitchen__walls__photos".to_string(), PathBuf::from("crack.jpg"))
        );
        assert!(parse_upload("no-separator").is_err());
        assert!(parse_upload("=x.jpg").is_err());
    }

    #[test]
    fn test_cli_parses_render() {
        let cli = Cli::try_parse_from([
            "report",
            "render",
            "--examination",
            "exam.json",
            "--template",
            "t.docx",
            "--out",
            "out.docx",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Render { screenshot: None, .. }));
    }

    #[test]
    fn test_cli_parses_repeated_files() {
        let cli = Cli::try_parse_from([
            "report",
            "merge",
            "--instance",
            "i.json",
            "--file",
            "photos=a.jpg",
            "--file",
            "walls__photos=b.jpg",
        ])
        .unwrap();
        match cli.command {
            Commands::Merge { files, .. } => assert_eq!(files.len(), 2),
            _ => panic!("expected merge"),
        }
    }
}
