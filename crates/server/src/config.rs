use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;
use shared::{domain::EntityType, naming::default_module, protocol::FieldSpec};
use tracing::warn;

const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub server_public_url: Option<String>,
    pub entities: Vec<EntityConfig>,
}

/// One administered entity type and the relations its edit form can quick-create.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EntityConfig {
    pub name: String,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub relations: Vec<FieldSpec>,
}

impl EntityConfig {
    pub fn entity_type(&self) -> EntityType {
        EntityType::new(self.name.clone())
    }

    pub fn module(&self) -> String {
        self.module
            .clone()
            .unwrap_or_else(|| default_module(&self.entity_type()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    database_url: Option<String>,
    server_public_url: Option<String>,
    #[serde(default)]
    entities: Vec<EntityConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/admin.db".into(),
            server_public_url: None,
            entities: default_entities(),
        }
    }
}

fn default_entities() -> Vec<EntityConfig> {
    let entity = |name: &str, columns: &[&str], relations: Vec<FieldSpec>| EntityConfig {
        name: name.to_string(),
        module: None,
        columns: columns.iter().map(|c| c.to_string()).collect(),
        relations,
    };
    vec![
        entity(
            "Event",
            &["name", "starts_at"],
            vec![FieldSpec::new("Venue"), FieldSpec::new("Dj")],
        ),
        entity("Venue", &["name", "city"], Vec::new()),
        entity("Dj", &["name"], Vec::new()),
    ]
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        match parse_file_settings(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(error) => warn!(%error, "ignoring unreadable {SETTINGS_FILE}"),
        }
    }

    if let Ok(v) = std::env::var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Ok(v) = std::env::var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Ok(v) = std::env::var("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Ok(v) = std::env::var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Ok(v) = std::env::var("SERVER_PUBLIC_URL") {
        settings.server_public_url = Some(v);
    }
    if let Ok(v) = std::env::var("APP__PUBLIC_URL") {
        settings.server_public_url = Some(v);
    }

    settings
}

fn parse_file_settings(raw: &str) -> anyhow::Result<FileSettings> {
    toml::from_str(raw).context("invalid server settings file")
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.bind_addr {
        settings.server_bind = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.server_public_url {
        settings.server_public_url = Some(v);
    }
    if !file_cfg.entities.is_empty() {
        settings.entities = file_cfg.entities;
    }
}

/// Base URL redirects are resolved against.
pub fn public_base_url(settings: &Settings) -> String {
    match &settings.server_public_url {
        Some(url) if !url.trim().is_empty() => url.trim().to_string(),
        _ => format!("http://{}/", settings.server_bind),
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
