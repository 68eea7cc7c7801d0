use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_ids: Vec<u64>, // Vacío: comandos globales

    // Reproducción
    pub idle_timeout: Duration,
    pub max_queue_size: usize,
    pub queue_page_size: usize,

    // Paths
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_source(|key| std::env::var(key).ok())?;

        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("no se pudo crear {}", config.data_dir.display()))?;

        Ok(config)
    }

    /// Construye la configuración leyendo cada variable con `get`.
    fn from_source(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| get(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            discord_token: var("DISCORD_TOKEN").context("falta DISCORD_TOKEN")?,
            application_id: var("APPLICATION_ID")
                .context("falta APPLICATION_ID")?
                .trim()
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_ids: match var("GUILD_IDS") {
                Some(list) => parse_id_list(&list)?,
                None => defaults.guild_ids,
            },

            idle_timeout: match var("IDLE_TIMEOUT") {
                Some(value) => humantime::parse_duration(value.trim())
                    .with_context(|| format!("IDLE_TIMEOUT inválido: {value}"))?,
                None => defaults.idle_timeout,
            },
            max_queue_size: match var("MAX_QUEUE_SIZE") {
                Some(value) => value.trim().parse().context("MAX_QUEUE_SIZE inválido")?,
                None => defaults.max_queue_size,
            },
            queue_page_size: match var("QUEUE_PAGE_SIZE") {
                Some(value) => value.trim().parse().context("QUEUE_PAGE_SIZE inválido")?,
                None => defaults.queue_page_size,
            },

            data_dir: var("DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    /// Comprueba que los valores tengan sentido antes de arrancar.
    fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN no puede estar vacío");
        }

        if self.idle_timeout.is_zero() {
            anyhow::bail!("IDLE_TIMEOUT debe ser mayor que cero");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("MAX_QUEUE_SIZE debe ser mayor que 0");
        }

        if !(1..=25).contains(&self.queue_page_size) {
            anyhow::bail!(
                "QUEUE_PAGE_SIZE debe estar entre 1 y 25, recibido: {}",
                self.queue_page_size
            );
        }

        Ok(())
    }

    /// Resumen sin datos sensibles, para el log de arranque.
    pub fn summary(&self) -> String {
        let guilds = if self.guild_ids.is_empty() {
            "global".to_string()
        } else {
            self.guild_ids
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };

        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guilds: {})\n  \
            Reproducción: salida tras {} sin actividad\n  \
            Cola: máx {} canciones, {} por página\n  \
            Datos: {}",
            self.application_id,
            guilds,
            humantime::format_duration(self.idle_timeout),
            self.max_queue_size,
            self.queue_page_size,
            self.data_dir.display(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            application_id: 0,
            guild_ids: Vec::new(),

            idle_timeout: Duration::from_secs(60),
            max_queue_size: 1000,
            queue_page_size: 10,

            data_dir: "data".into(),
        }
    }
}

fn parse_id_list(list: &str) -> Result<Vec<u64>> {
    list.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<u64>()
                .with_context(|| format!("ID de servidor inválido en GUILD_IDS: {id}"))
        })
        .collect()
}
