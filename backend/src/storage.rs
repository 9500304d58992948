use futures::FutureExt;

use common::SteamId;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("replay {0} not found")]
    NotFound(String),
    #[error("replay storage io: {0}")]
    Io(#[from] std::io::Error),
}

/// Where accepted replays end up.
pub trait ReplayStorage: Send + Sync {
    fn store<'f, 'own>(
        &'own self,
        steam_id: SteamId,
        run_id: uuid::Uuid,
        data: axum::body::Bytes,
    ) -> futures::future::BoxFuture<'f, Result<(), StorageError>>
    where
        'own: 'f;

    fn load<'f, 'own>(
        &'own self,
        steam_id: SteamId,
        run_id: uuid::Uuid,
    ) -> futures::future::BoxFuture<'f, Result<axum::body::Bytes, StorageError>>
    where
        'own: 'f;
}

/// Stores replays as `<folder>/<steamID>/<runID>.mrf`.
pub struct FileStorage {
    folder: std::path::PathBuf,
}

impl FileStorage {
    pub fn new<P>(folder: P) -> Self
    where
        P: Into<std::path::PathBuf>,
    {
        Self {
            folder: folder.into(),
        }
    }

    pub fn replay_path(&self, steam_id: SteamId, run_id: uuid::Uuid) -> std::path::PathBuf {
        self.folder
            .join(steam_id.to_string())
            .join(format!("{}.mrf", run_id))
    }
}

impl ReplayStorage for FileStorage {
    fn store<'f, 'own>(
        &'own self,
        steam_id: SteamId,
        run_id: uuid::Uuid,
        data: axum::body::Bytes,
    ) -> futures::future::BoxFuture<'f, Result<(), StorageError>>
    where
        'own: 'f,
    {
        let path = self.replay_path(steam_id, run_id);

        async move {
            if let Some(user_folder) = path.parent() {
                if !tokio::fs::try_exists(user_folder).await.unwrap_or(false) {
                    tokio::fs::create_dir_all(user_folder).await?;
                }
            }

            // Readers never see a half written replay.
            let tmp_path = path.with_extension("mrf.tmp");
            tokio::fs::write(&tmp_path, &data).await?;
            tokio::fs::rename(&tmp_path, &path).await?;

            tracing::debug!("Stored {} bytes at {:?}", data.len(), path);

            Ok(())
        }
        .boxed()
    }

    fn load<'f, 'own>(
        &'own self,
        steam_id: SteamId,
        run_id: uuid::Uuid,
    ) -> futures::future::BoxFuture<'f, Result<axum::body::Bytes, StorageError>>
    where
        'own: 'f,
    {
        let path = self.replay_path(steam_id, run_id);

        async move {
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(axum::body::Bytes::from(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(StorageError::NotFound(format!("{}/{}", steam_id, run_id)))
                }
                Err(e) => Err(e.into()),
            }
        }
        .boxed()
    }
}
