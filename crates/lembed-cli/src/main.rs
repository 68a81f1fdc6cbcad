mod config;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::debug;

use lembed_core::{
    cosine_similarity, Embedder, EmbeddingConfig, PoolingMode, Strategy, StructuralSignal,
};

use crate::config::Config;

#[derive(Parser)]
#[command(
    name = "lembed",
    version,
    about = "Text embeddings for inputs of any length"
)]
struct Cli {
    /// Model directory containing model.onnx and tokenizer.json
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Hugging Face repo to fetch the model from
    #[arg(long, global = true)]
    hub: Option<String>,

    /// Maximum tokens per decode call
    #[arg(long, global = true)]
    context_size: Option<usize>,

    /// Inference threads (0 = auto)
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Pooling mode: mean, cls or last
    #[arg(long, global = true)]
    pooling: Option<PoolingMode>,

    /// Long-text strategy: auto, truncate, chunk:<max>:<overlap>, window:<size>
    #[arg(long, global = true)]
    strategy: Option<Strategy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed a text and print the vector
    Embed {
        /// Text to embed (reads stdin if omitted)
        text: Option<String>,

        /// Read the text from a file
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Print the full vector as JSON
        #[arg(long)]
        json: bool,

        /// L2-normalize the output
        #[arg(long)]
        normalize: bool,
    },

    /// Cosine similarity between two texts
    Similarity { a: String, b: String },

    /// Rank documents by similarity to a query
    Search {
        /// Search query
        #[arg(short, long)]
        query: String,

        /// Documents to rank
        #[arg(required = true)]
        docs: Vec<String>,
    },

    /// Similarity of every pair of texts
    Pairs {
        #[arg(required = true, num_args = 2..)]
        texts: Vec<String>,
    },

    /// Show model and embedding settings
    Info,

    /// Show how an input of a given size would be split (no model needed)
    Plan {
        /// Token count of the input
        #[arg(short, long)]
        tokens: usize,

        /// Line count of the source text
        #[arg(long, default_value = "0")]
        lines: usize,

        /// Sentence terminator count of the source text
        #[arg(long, default_value = "0")]
        sentences: usize,
    },

    /// Show the active configuration
    Config,
}

/// Where the model is loaded from, after merging flags and config.
#[derive(Debug, Clone, PartialEq)]
enum ModelSource {
    Dir(PathBuf),
    Hub(String),
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dir(p) => write!(f, "{}", p.display()),
            Self::Hub(repo) => write!(f, "hf:{repo}"),
        }
    }
}

fn model_source(cli: &Cli, cfg: &Config) -> Option<ModelSource> {
    if let Some(p) = &cli.model {
        return Some(ModelSource::Dir(p.clone()));
    }
    if let Some(repo) = &cli.hub {
        return Some(ModelSource::Hub(repo.clone()));
    }
    if let Some(p) = &cfg.model.path {
        return Some(ModelSource::Dir(PathBuf::from(p)));
    }
    cfg.model.hub_repo.clone().map(ModelSource::Hub)
}

/// Command-line flags override values from the config file.
fn effective_embedding(cli: &Cli, cfg: &Config) -> EmbeddingConfig {
    let mut emb = cfg.embedding.clone();
    if let Some(n) = cli.context_size {
        emb.context_size = n;
    }
    if let Some(n) = cli.threads {
        emb.threads = n;
    }
    if let Some(p) = cli.pooling {
        emb.pooling = p;
    }
    if let Some(s) = cli.strategy {
        emb.strategy = s;
    }
    emb
}

#[cfg(feature = "onnx")]
fn load_embedder(
    source: Option<&ModelSource>,
    config: EmbeddingConfig,
) -> Result<Box<dyn Embedder>> {
    use lembed_core::{EmbeddingModel, OnnxEngine};

    let engine = match source {
        Some(ModelSource::Dir(p)) => OnnxEngine::load(p, &config),
        Some(ModelSource::Hub(repo)) => OnnxEngine::from_hub(repo, &config),
        None => bail!("no model configured: pass --model <dir> or set [model] path in the config"),
    }
    .context("failed to load model")?;
    Ok(Box::new(EmbeddingModel::new(engine, config)?))
}

#[cfg(not(feature = "onnx"))]
fn load_embedder(
    _source: Option<&ModelSource>,
    _config: EmbeddingConfig,
) -> Result<Box<dyn Embedder>> {
    bail!("lembed was built without model support; rebuild with `--features onnx`")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config()?;
    let mut embedding = effective_embedding(&cli, &cfg);
    embedding.validate()?;
    let source = model_source(&cli, &cfg);
    debug!(?source, context_size = embedding.context_size, "resolved settings");

    match &cli.command {
        Commands::Plan {
            tokens,
            lines,
            sentences,
        } => {
            let signal = StructuralSignal {
                line_count: *lines,
                sentence_terminators: *sentences,
            };
            print!("{}", plan_report(&embedding, *tokens, signal)?);
            Ok(())
        }
        Commands::Config => cmd_config(&cfg, &embedding, source.as_ref()),
        Commands::Embed {
            text,
            file,
            json,
            normalize,
        } => {
            let input = read_input(text.as_deref(), file.as_deref())?;
            embedding.normalize |= *normalize;
            let embedder = load_embedder(source.as_ref(), embedding)?;
            cmd_embed(embedder.as_ref(), &input, *json, cfg.output.preview)
        }
        Commands::Similarity { a, b } => {
            let embedder = load_embedder(source.as_ref(), embedding)?;
            let score = cosine_similarity(&embedder.embed(a)?, &embedder.embed(b)?);
            println!("{score:.4}");
            Ok(())
        }
        Commands::Search { query, docs } => {
            let embedder = load_embedder(source.as_ref(), embedding)?;
            for (rank, (idx, score)) in rank_documents(embedder.as_ref(), query, docs)?
                .into_iter()
                .enumerate()
            {
                println!("{}. [{score:.3}] {}", rank + 1, docs[idx]);
            }
            Ok(())
        }
        Commands::Pairs { texts } => {
            let embedder = load_embedder(source.as_ref(), embedding)?;
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let vectors = embedder.embed_batch(&refs)?;
            for (i, j, score) in pairwise(&vectors) {
                println!("'{}' vs '{}': {score:.3}", texts[i], texts[j]);
            }
            Ok(())
        }
        Commands::Info => {
            let embedder = load_embedder(source.as_ref(), embedding.clone())?;
            let source = source.map(|s| s.to_string()).unwrap_or_default();
            println!("model:          {source}");
            println!("dimension:      {}", embedder.dimensions());
            print_embedding_config(&embedding);
            Ok(())
        }
    }
}

fn read_input(text: Option<&str>, file: Option<&std::path::Path>) -> Result<String> {
    if let Some(t) = text {
        return Ok(t.to_string());
    }
    if let Some(p) = file {
        return std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()));
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("reading stdin")?;
    Ok(buf)
}

fn cmd_embed(embedder: &dyn Embedder, text: &str, as_json: bool, preview: usize) -> Result<()> {
    let vector = embedder.embed(text)?;
    if as_json {
        let out = json!({ "dimension": vector.len(), "embedding": vector });
        println!("{}", serde_json::to_string(&out)?);
    } else {
        println!("dimension: {}", vector.len());
        println!("first {}: {}", preview.min(vector.len()), format_preview(&vector, preview));
    }
    Ok(())
}

fn format_preview(vector: &[f32], n: usize) -> String {
    let shown: Vec<String> = vector.iter().take(n).map(|x| format!("{x:.4}")).collect();
    format!("[{}]", shown.join(", "))
}

/// Document indices sorted by similarity to `query`, highest first.
fn rank_documents(
    embedder: &dyn Embedder,
    query: &str,
    docs: &[String],
) -> Result<Vec<(usize, f32)>> {
    let query_vec = embedder.embed(query)?;
    let mut scored = Vec::with_capacity(docs.len());
    for (idx, doc) in docs.iter().enumerate() {
        let doc_vec = embedder
            .embed(doc)
            .with_context(|| format!("embedding document {}", idx + 1))?;
        scored.push((idx, cosine_similarity(&query_vec, &doc_vec)));
    }
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(scored)
}

/// Similarity of every `(i, j)` with `i < j`.
fn pairwise(vectors: &[Vec<f32>]) -> Vec<(usize, usize, f32)> {
    let mut out = Vec::new();
    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            out.push((i, j, cosine_similarity(&vectors[i], &vectors[j])));
        }
    }
    out
}

fn plan_report(
    config: &EmbeddingConfig,
    tokens: usize,
    signal: StructuralSignal,
) -> Result<String> {
    use std::fmt::Write;

    let ctx = config.context_size;
    let mut out = String::new();
    if tokens == 0 {
        bail!("token count must be at least 1");
    }
    if tokens <= ctx {
        writeln!(out, "{tokens} tokens fit the context ({ctx}): single decode")?;
        return Ok(out);
    }

    let plan = lembed_core::resolve(config.strategy, tokens, ctx, signal, config.min_tail_tokens)?;
    let windows = plan.windows(tokens);
    writeln!(
        out,
        "{tokens} tokens, context {ctx}, ratio {:.2}",
        lembed_core::strategy::overflow_ratio(tokens, ctx)
    )?;
    writeln!(out, "strategy: {} -> {plan}", config.strategy)?;
    writeln!(out, "decodes: {}", windows.len())?;
    for (i, w) in windows.iter().enumerate() {
        writeln!(out, "  {:>3}. tokens {}..{} ({})", i + 1, w.start, w.end, w.len())?;
    }
    Ok(out)
}

fn print_embedding_config(emb: &EmbeddingConfig) {
    println!("context_size:   {}", emb.context_size);
    println!("threads:        {}", emb.threads);
    println!("pooling:        {}", emb.pooling);
    println!("normalize:      {}", emb.normalize);
    println!("strategy:       {}", emb.strategy);
    match emb.min_tail_tokens {
        Some(n) => println!("min_tail_tokens: {n}"),
        None => println!("min_tail_tokens: (chunk overlap)"),
    }
}

fn cmd_config(cfg: &Config, emb: &EmbeddingConfig, source: Option<&ModelSource>) -> Result<()> {
    println!("Config: {}", config::show_config_path());
    println!();
    println!("[model]");
    match source {
        Some(s) => println!("  source = {s}"),
        None => println!("  source = (none)"),
    }
    println!();
    println!("[embedding]");
    print_embedding_config(emb);
    println!();
    println!("[output]");
    println!("  preview = {}", cfg.output.preview);
    Ok(())
}

#[cfg(test)]
mod tests {
    use lembed_core::{EmbedError, EmbedResult};

    use super::*;

    /// Letter-frequency embedder over a-z.
    struct LetterEmbedder;

    impl Embedder for LetterEmbedder {
        fn embed(&self, text: &str) -> EmbedResult<Vec<f32>> {
            if text.trim().is_empty() {
                return Err(EmbedError::TokenizationFailed("empty".into()));
            }
            let mut v = vec![0.0; 26];
            for c in text.to_lowercase().chars().filter(char::is_ascii_lowercase) {
                v[(c as u8 - b'a') as usize] += 1.0;
            }
            Ok(v)
        }

        fn embed_batch(&self, texts: &[&str]) -> EmbedResult<Vec<Vec<f32>>> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimensions(&self) -> usize {
            26
        }
    }

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["lembed"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_flags_override_config() {
        let cfg: Config = toml::from_str(
            r#"
[embedding]
context_size = 256
strategy = "truncate"
threads = 2
"#,
        )
        .unwrap();
        let args = cli(&["--context-size", "128", "--strategy", "chunk:64:8", "info"]);
        let emb = effective_embedding(&args, &cfg);
        assert_eq!(emb.context_size, 128);
        assert_eq!(
            emb.strategy,
            Strategy::Chunk {
                max_chunk_size: 64,
                overlap: 8
            }
        );
        assert_eq!(emb.threads, 2);
    }

    #[test]
    fn test_invalid_strategy_flag_rejected() {
        assert!(Cli::try_parse_from(["lembed", "--strategy", "bogus", "info"]).is_err());
    }

    #[test]
    fn test_model_source_precedence() {
        let cfg: Config = toml::from_str(
            r#"
[model]
path = "/from/config"
hub_repo = "org/model"
"#,
        )
        .unwrap();
        assert_eq!(
            model_source(&cli(&["info"]), &cfg),
            Some(ModelSource::Dir(PathBuf::from("/from/config")))
        );
        assert_eq!(
            model_source(&cli(&["--hub", "org/other", "info"]), &cfg),
            Some(ModelSource::Hub("org/other".into()))
        );
        assert_eq!(
            model_source(&cli(&["--model", "/flag", "info"]), &cfg),
            Some(ModelSource::Dir(PathBuf::from("/flag")))
        );
        assert_eq!(model_source(&cli(&["info"]), &Config::default()), None);
    }

    #[test]
    fn test_rank_documents_orders_by_similarity() {
        let docs = vec![
            "zzzz qqqq".to_string(),
            "cat sat on the mat".to_string(),
            "the cat".to_string(),
        ];
        let ranked = rank_documents(&LetterEmbedder, "the cat", &docs).unwrap();
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].0, 2);
        assert_eq!(ranked[2].0, 0);
        assert!(ranked.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_rank_documents_fails_on_empty_doc() {
        let docs = vec!["ok".to_string(), "   ".to_string()];
        assert!(rank_documents(&LetterEmbedder, "ok", &docs).is_err());
    }

    #[test]
    fn test_pairwise_all_pairs() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]];
        let pairs = pairwise(&vectors);
        assert_eq!(pairs.len(), 3);
        assert_eq!((pairs[0].0, pairs[0].1), (0, 1));
        assert!((pairs[1].2 - 1.0).abs() < 1e-6);
        assert!(pairs[2].2.abs() < 1e-6);
    }

    #[test]
    fn test_format_preview() {
        assert_eq!(format_preview(&[0.5, -1.0, 2.0], 2), "[0.5000, -1.0000]");
        assert_eq!(format_preview(&[], 5), "[]");
    }

    #[test]
    fn test_read_input_prefers_text_then_file() {
        use std::io::Write;

        assert_eq!(read_input(Some("inline"), None).unwrap(), "inline");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "from file").unwrap();
        assert_eq!(read_input(None, Some(file.path())).unwrap(), "from file");
        assert!(read_input(None, Some(std::path::Path::new("/no/such/file"))).is_err());
    }

    #[test]
    fn test_plan_report_short_input() {
        let cfg = EmbeddingConfig {
            context_size: 100,
            ..Default::default()
        };
        let report = plan_report(&cfg, 80, StructuralSignal::default()).unwrap();
        assert!(report.contains("single decode"));
    }

    #[test]
    fn test_plan_report_chunked() {
        let cfg = EmbeddingConfig {
            context_size: 100,
            ..Default::default()
        };
        let signal = StructuralSignal {
            line_count: 12,
            sentence_terminators: 0,
        };
        let report = plan_report(&cfg, 350, signal).unwrap();
        assert!(report.contains("decodes: 7"));
        assert!(report.contains("tokens 300..350"));
    }

    #[test]
    fn test_plan_report_bad_overlap() {
        let cfg = EmbeddingConfig {
            context_size: 100,
            strategy: Strategy::Chunk {
                max_chunk_size: 20,
                overlap: 30,
            },
            ..Default::default()
        };
        assert!(plan_report(&cfg, 500, StructuralSignal::default()).is_err());
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_load_embedder_without_onnx() {
        let err = load_embedder(None, EmbeddingConfig::default()).err().unwrap();
        assert!(err.to_string().contains("--features onnx"));
    }
}
