use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use vsearch::build::{
    build_catalog_with, fetch_url_images, load_local_dir, load_url_manifest, BuildReport,
};
use vsearch::config::VsearchConfig;
use vsearch::PixelEmbedder;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Source {
    /// A directory of `<product_id>.<ext>` files
    Local,
    /// A JSON list of `{url, product_id}` objects
    Urls,
}

#[derive(Parser, Debug)]
#[command(
    name = "vsearch-build",
    about = "Embed product images and write the HNSW index + identifier table"
)]
struct BuildCli {
    /// Where to load images from
    #[arg(long, value_enum, env = "VSEARCH_SOURCE", default_value_t = Source::Local)]
    source: Source,

    /// (local) directory of images named <product_id>.<ext>
    #[arg(long, env = "VSEARCH_IMAGE_DIR")]
    image_dir: Option<PathBuf>,

    /// (urls) JSON list of {url, product_id} objects
    #[arg(long, env = "VSEARCH_URLS_FILE")]
    urls_file: Option<PathBuf>,

    /// Artifacts land at <prefix>.hnsw, <prefix>.ids.json and <prefix>.report.json
    #[arg(long, env = "VSEARCH_OUTPUT_PREFIX")]
    output_prefix: Option<PathBuf>,

    /// Optional YAML pipeline configuration
    #[arg(long, env = "VSEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Override HNSW links per node
    #[arg(long)]
    m: Option<usize>,

    /// Override HNSW construction beam width
    #[arg(long)]
    ef_construction: Option<usize>,

    /// Catalogs smaller than this are searched by exact scan
    #[arg(long)]
    min_vectors_for_ann: Option<usize>,

    /// Catalog vectors re-queried to estimate recall@10 (0 disables)
    #[arg(long)]
    recall_sample: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = BuildCli::parse();
    let mut cfg = match &cli.config {
        Some(path) => VsearchConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => VsearchConfig::default(),
    };
    apply_overrides(&mut cfg, &cli);
    cfg.validate().context("invalid configuration")?;

    let (images, load_failures) = match cli.source {
        Source::Local => {
            let Some(dir) = &cli.image_dir else {
                bail!("--image-dir is required for the local source");
            };
            load_local_dir(dir)?
        }
        Source::Urls => {
            let Some(path) = &cli.urls_file else {
                bail!("--urls-file is required for the urls source");
            };
            let entries = load_url_manifest(path)?;
            let timeout = Duration::from_secs(cfg.build.fetch_timeout_secs);
            fetch_url_images(&entries, timeout).await?
        }
    };
    tracing::info!(images = images.len(), source = ?cli.source, "loaded images");

    let embedder = PixelEmbedder::new(cfg.embed.clone())?;
    let index_cfg = cfg.index;
    let recall_sample = cfg.build.recall_sample;
    let (catalog, report) = tokio::task::spawn_blocking(move || {
        build_catalog_with(&images, &embedder, index_cfg, recall_sample)
    })
    .await
    .context("build task panicked")??;
    let report: BuildReport = report.with_load_failures(load_failures);

    let prefix = PathBuf::from(&cfg.build.output_prefix);
    let paths = catalog.save_with(&prefix, &cfg.build.compression_config())?;
    report.write(&prefix)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    println!(
        "wrote {} and {}",
        paths.index.display(),
        paths.table.display()
    );
    Ok(())
}

fn apply_overrides(cfg: &mut VsearchConfig, cli: &BuildCli) {
    if let Some(prefix) = &cli.output_prefix {
        cfg.build.output_prefix = prefix.to_string_lossy().into_owned();
    }
    if let Some(m) = cli.m {
        cfg.index.m = m;
    }
    if let Some(ef) = cli.ef_construction {
        cfg.index.ef_construction = ef;
    }
    if let Some(min) = cli.min_vectors_for_ann {
        cfg.index.min_vectors_for_ann = min;
    }
    if let Some(sample) = cli.recall_sample {
        cfg.build.recall_sample = sample;
    }
}
