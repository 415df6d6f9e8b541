use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Largest `MaxResults` the collection listing accepts.
pub const MAX_LIST_FACES_PAGE_SIZE: usize = 4096;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("list_faces_page_size must be between 1 and {MAX_LIST_FACES_PAGE_SIZE}, got {0}")]
    PageSizeOutOfRange(usize),
}

/// Table, index, collection and bucket names, loaded from an optional TOML
/// file and then overridden by `FACESWEEP_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Table holding one record per detected face.
    pub indexed_table: String,
    /// Table holding one summary record per user.
    pub users_table: String,
    /// Index on `indexed_table` keyed by `user_id`.
    pub user_index: String,
    /// Index on `indexed_table` keyed by `folder_name` + `user_id`.
    pub folder_user_index: String,
    /// Recognition collection the routines operate on.
    pub collection_id: String,
    /// Bucket that receives generated thumbnails.
    pub thumbnail_bucket: String,
    /// Folder used when a payload names none.
    pub default_folder: Option<String>,
    /// `MaxResults` for collection listing.
    pub list_faces_page_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            indexed_table: "indexed_data".to_string(),
            users_table: "RekognitionUsersData".to_string(),
            user_index: "user_id-index".to_string(),
            folder_user_index: "folder_name-user_id-index".to_string(),
            collection_id: "FlashbackUserDataCollection".to_string(),
            thumbnail_bucket: "rekognitionuserfaces".to_string(),
            default_folder: None,
            list_faces_page_size: 1000,
        }
    }
}

impl Settings {
    /// Load from `path` (if any), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Load using `FACESWEEP_CONFIG` as the file path when set.
    pub fn from_env() -> Result<Self, SettingsError> {
        let path = std::env::var_os("FACESWEEP_CONFIG");
        Self::load(path.as_deref().map(Path::new))
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Apply `FACESWEEP_*` overrides from `lookup`. Unparsable numbers are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let text = |key: &str, field: &mut String| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *field = value;
            }
        };
        text("FACESWEEP_INDEXED_TABLE", &mut self.indexed_table);
        text("FACESWEEP_USERS_TABLE", &mut self.users_table);
        text("FACESWEEP_USER_INDEX", &mut self.user_index);
        text("FACESWEEP_FOLDER_USER_INDEX", &mut self.folder_user_index);
        text("FACESWEEP_COLLECTION_ID", &mut self.collection_id);
        text("FACESWEEP_THUMBNAIL_BUCKET", &mut self.thumbnail_bucket);

        if let Some(folder) = lookup("FACESWEEP_DEFAULT_FOLDER").filter(|v| !v.is_empty()) {
            self.default_folder = Some(folder);
        }
        if let Some(size) = lookup("FACESWEEP_LIST_FACES_PAGE_SIZE").and_then(|v| v.parse().ok()) {
            self.list_faces_page_size = size;
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(1..=MAX_LIST_FACES_PAGE_SIZE).contains(&self.list_faces_page_size) {
            return Err(SettingsError::PageSizeOutOfRange(self.list_faces_page_size));
        }
        Ok(())
    }
}
