use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Name of the per-directory config file that overrides the platform one.
pub const LOCAL_CONFIG_NAME: &str = ".versemap.toml";

/// On-disk TOML configuration.
/// Every field is optional; absent values fall through to the next layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api: Option<ApiConfig>,
    pub retry: Option<RetryConfig>,
    pub pipeline: Option<PipelineConfig>,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub audio_base_url: Option<String>,
    pub token: Option<String>,
    pub client_id: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub pacing_delay_ms: Option<u64>,
    pub resolve_chapter_names: Option<bool>,
    pub checkpoint_every: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub tafsir_base_url: Option<String>,
    pub tafsir_slug: Option<String>,
}

/// Platform config path: `<config_dir>/versemap/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("versemap").join("config.toml"))
}

/// Load config by cascading `./.versemap.toml` over the platform config.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let local = load_from_path(Path::new(LOCAL_CONFIG_NAME));

    match (platform, local) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(l)) => l,
        (Some(p), Some(l)) => merge(p, l),
    }
}

/// Load a config file. Returns `None` if it is missing or unparseable.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// First `Some` of `overlay` then `base`, reading one field of one section.
fn pick<S, T>(
    overlay: &Option<S>,
    base: &Option<S>,
    field: impl Fn(&S) -> Option<T>,
) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs field by field; `overlay` wins.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (ob, bb) = (&overlay.api, &base.api);
    let api = ApiConfig {
        base_url: pick(ob, bb, |a| a.base_url.clone()),
        audio_base_url: pick(ob, bb, |a| a.audio_base_url.clone()),
        token: pick(ob, bb, |a| a.token.clone()),
        client_id: pick(ob, bb, |a| a.client_id.clone()),
        timeout_secs: pick(ob, bb, |a| a.timeout_secs),
    };

    let (or, br) = (&overlay.retry, &base.retry);
    let retry = RetryConfig {
        max_attempts: pick(or, br, |r| r.max_attempts),
        delay_ms: pick(or, br, |r| r.delay_ms),
    };

    let (op, bp) = (&overlay.pipeline, &base.pipeline);
    let pipeline = PipelineConfig {
        pacing_delay_ms: pick(op, bp, |p| p.pacing_delay_ms),
        resolve_chapter_names: pick(op, bp, |p| p.resolve_chapter_names),
        checkpoint_every: pick(op, bp, |p| p.checkpoint_every),
    };

    let (oo, bo) = (&overlay.output, &base.output);
    let output = OutputConfig {
        tafsir_base_url: pick(oo, bo, |o| o.tafsir_base_url.clone()),
        tafsir_slug: pick(oo, bo, |o| o.tafsir_slug.clone()),
    };

    ConfigFile {
        api: Some(api),
        retry: Some(retry),
        pipeline: Some(pipeline),
        output: Some(output),
    }
}

/// Write `config` to the platform config path, creating the directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, String> {
    let path = config_path().ok_or_else(|| "Could not determine config directory".to_string())?;
    save_to_path(config, &path)?;
    Ok(path)
}

pub fn save_to_path(config: &ConfigFile, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))
}
