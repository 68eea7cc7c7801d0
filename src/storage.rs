use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const THEMES_FILE: &str = "user_themes.json";

/// Contenido de `user_themes.json`. Las claves son IDs de usuario como texto.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ThemesFile {
    #[serde(default)]
    user_themes: HashMap<String, String>,
}

/// Temas de bienvenida por usuario, persistidos en JSON.
pub struct ThemeStore {
    path: PathBuf,
    themes: HashMap<u64, String>,
}

impl ThemeStore {
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).await?;

        let path = data_dir.join(THEMES_FILE);
        let themes = Self::load(&path).await;

        info!("📁 Temas cargados desde {}", path.display());

        Ok(Self { path, themes })
    }

    pub fn get_theme(&self, user_id: u64) -> Option<&str> {
        self.themes.get(&user_id).map(String::as_str)
    }

    pub async fn set_theme(&mut self, user_id: u64, url: impl Into<String>) -> Result<()> {
        self.themes.insert(user_id, url.into());
        self.save().await?;
        info!("💾 Tema actualizado para el usuario {}", user_id);
        Ok(())
    }

    /// Devuelve `false` si el usuario no tenía tema.
    pub async fn clear_theme(&mut self, user_id: u64) -> Result<bool> {
        if self.themes.remove(&user_id).is_none() {
            return Ok(false);
        }
        self.save().await?;
        info!("🗑️ Tema eliminado para el usuario {}", user_id);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.themes.len()
    }

    async fn load(path: &Path) -> HashMap<u64, String> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("Sin archivo de temas ({}), empezando vacío", e);
                return HashMap::new();
            }
        };

        let file: ThemesFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!("Archivo de temas corrupto en {}: {}", path.display(), e);
                return HashMap::new();
            }
        };

        file.user_themes
            .into_iter()
            .filter_map(|(user, url)| match user.parse::<u64>() {
                Ok(id) => Some((id, url)),
                Err(_) => {
                    warn!("ID de usuario inválido en temas: {}", user);
                    None
                }
            })
            .collect()
    }

    async fn save(&self) -> Result<()> {
        let file = ThemesFile {
            user_themes: self
                .themes
                .iter()
                .map(|(id, url)| (id.to_string(), url.clone()))
                .collect(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        // Escritura atómica: archivo temporal + rename.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
