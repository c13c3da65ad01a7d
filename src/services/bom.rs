use dashmap::DashMap;
use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, TransactionTrait};
use std::{collections::BTreeSet, io::Read, path::PathBuf, sync::Arc, time::Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::{AppConfig, SheetFormat},
    entities::bom_version,
    errors::ServiceError,
    services::bom_tree::{
        self, tabular, versions, xlsx, BomGraph, BomNode, CsvSheetRenderer, ImportRow,
        ImportSummary, LoadOptions, ManifestEntry, SeaOrmBomRepository, SheetRenderer,
        XlsxSheetRenderer,
    },
};

/// In-process async locks keyed by material id.
///
/// An import holds the lock of every material whose versions it rewrites, so
/// two imports sharing a sub-assembly queue up while unrelated ones run in
/// parallel.
#[derive(Clone, Default)]
pub struct ImportLocks {
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl ImportLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for every lock in ascending id order, so overlapping sets
    /// cannot deadlock. The locks are released when the guards drop.
    pub async fn acquire(&self, material_ids: &BTreeSet<i64>) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(material_ids.len());
        for id in material_ids {
            let lock = self
                .locks
                .entry(*id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push(lock.lock_owned().await);
        }
        guards
    }
}

/// Modular BOM service: tree expansion, flat export, import and export
/// manifests over the relational store.
#[derive(Clone)]
pub struct BomService {
    db: Arc<DatabaseConnection>,
    import_locks: ImportLocks,
    renderer: Arc<dyn SheetRenderer>,
    drawing_root: PathBuf,
    import_max_rows: usize,
}

impl BomService {
    pub fn from_config(db: Arc<DatabaseConnection>, config: &AppConfig) -> Self {
        let renderer: Arc<dyn SheetRenderer> = match config.sheet_format {
            SheetFormat::Xlsx => Arc::new(XlsxSheetRenderer),
            SheetFormat::Csv => Arc::new(CsvSheetRenderer),
        };
        Self {
            db,
            import_locks: ImportLocks::new(),
            renderer,
            drawing_root: config.drawing_root(),
            import_max_rows: config.import_max_rows,
        }
    }

    /// Replaces the renderer used for generated manifest sheets.
    pub fn with_renderer(mut self, renderer: Arc<dyn SheetRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    async fn load_version_graph(
        &self,
        version_id: i64,
        options: LoadOptions,
    ) -> Result<BomGraph, ServiceError> {
        let repo = SeaOrmBomRepository::new(&*self.db);
        let (graph, _) = BomGraph::load_from_version(&repo, version_id, options).await?;
        Ok(graph)
    }

    /// The active version of a material, if it has one.
    #[instrument(skip(self))]
    pub async fn resolve_active_version(
        &self,
        material_id: i64,
    ) -> Result<Option<bom_version::Model>, ServiceError> {
        versions::find_material(&*self.db, material_id).await?;
        versions::find_active_version(&*self.db, material_id).await
    }

    /// Expands a version into its full multi-level tree.
    #[instrument(skip(self))]
    pub async fn expand(&self, version_id: i64) -> Result<Vec<BomNode>, ServiceError> {
        let started = Instant::now();
        let graph = self.load_version_graph(version_id, LoadOptions::default()).await?;

        let tree = bom_tree::expand(&graph, version_id).map_err(|e| {
            error!("Failed to expand BOM version {}: {}", version_id, e);
            e
        })?;

        counter!("modular_bom.expansions", 1);
        histogram!(
            "modular_bom.expand_duration_seconds",
            started.elapsed().as_secs_f64()
        );
        Ok(tree)
    }

    /// Expands a version and serializes the tree in pre-order.
    #[instrument(skip(self))]
    pub async fn flatten(&self, version_id: i64) -> Result<Vec<BomNode>, ServiceError> {
        let tree = self.expand(version_id).await?;
        Ok(bom_tree::flatten(tree))
    }

    /// CSV of the flattened tree with an outline level column.
    #[instrument(skip(self))]
    pub async fn export_csv(&self, version_id: i64) -> Result<Vec<u8>, ServiceError> {
        let flat = self.flatten(version_id).await?;
        tabular::export_csv(&flat)
    }

    /// Same rows as [`Self::export_csv`] in an xlsx workbook.
    #[instrument(skip(self))]
    pub async fn export_xlsx(&self, version_id: i64) -> Result<Vec<u8>, ServiceError> {
        let flat = self.flatten(version_id).await?;
        xlsx::export_xlsx(&flat)
    }

    /// Replaces the structure of a version with flattened rows.
    ///
    /// Runs in one transaction; any failure leaves the stored graph as it was.
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn import(
        &self,
        version_id: i64,
        rows: Vec<ImportRow>,
    ) -> Result<ImportSummary, ServiceError> {
        let rows = bom_tree::import::prefilter_rows(rows);
        if rows.len() > self.import_max_rows {
            return Err(ServiceError::ValidationError(format!(
                "import has {} rows, the limit is {}",
                rows.len(),
                self.import_max_rows
            )));
        }

        let scope = bom_tree::import_scope(&*self.db, version_id, &rows).await?;
        debug!(version_id, materials = ?scope, "Waiting for import locks");
        let _guards = self.import_locks.acquire(&scope).await;

        let started = Instant::now();
        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin import transaction: {}", e);
            ServiceError::db_error(e)
        })?;

        let summary = match bom_tree::import_rows(&txn, version_id, &rows).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Import into BOM version {} rolled back: {}", version_id, e);
                counter!("modular_bom.import_failures", 1);
                txn.rollback().await.map_err(ServiceError::db_error)?;
                return Err(e);
            }
        };

        txn.commit().await.map_err(|e| {
            error!("Failed to commit import into version {}: {}", version_id, e);
            ServiceError::db_error(e)
        })?;

        counter!("modular_bom.imported_lines", summary.imported_count as u64);
        histogram!(
            "modular_bom.import_duration_seconds",
            started.elapsed().as_secs_f64()
        );
        info!(
            "BOM import committed: version_id={}, lines={}, created_versions={}",
            version_id,
            summary.imported_count,
            summary.created_versions.len()
        );
        Ok(summary)
    }

    /// Parses CSV rows and imports them.
    pub async fn import_csv<R: Read>(
        &self,
        version_id: i64,
        reader: R,
    ) -> Result<ImportSummary, ServiceError> {
        let rows = tabular::parse_import_csv(reader)?;
        self.import(version_id, rows).await
    }

    /// Reads the first sheet of an xlsx workbook and imports it.
    pub async fn import_xlsx(
        &self,
        version_id: i64,
        workbook: &[u8],
    ) -> Result<ImportSummary, ServiceError> {
        let rows = xlsx::parse_import_xlsx(workbook)?;
        self.import(version_id, rows).await
    }

    /// Files and generated sheets for archiving a material's structure.
    #[instrument(skip(self))]
    pub async fn collect_manifest(
        &self,
        material_id: i64,
    ) -> Result<Vec<ManifestEntry>, ServiceError> {
        let repo = SeaOrmBomRepository::new(&*self.db);
        let (graph, _) = BomGraph::load_from_material(
            &repo,
            material_id,
            LoadOptions {
                with_drawings: true,
            },
        )
        .await?;

        let entries = bom_tree::collect_manifest(
            &graph,
            material_id,
            self.renderer.as_ref(),
            &self.drawing_root,
        )?;
        counter!("modular_bom.manifests", 1);
        Ok(entries)
    }

    /// Creates `<material_code>_V<suffix>` (next free `V<n>.0` without a
    /// suffix), optionally making it the active version.
    #[instrument(skip(self))]
    pub async fn create_version(
        &self,
        material_id: i64,
        suffix: Option<String>,
        remark: Option<String>,
        activate: bool,
    ) -> Result<bom_version::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let version =
            versions::create_version(&txn, material_id, suffix.as_deref(), remark, activate)
                .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(version)
    }

    /// Makes a version the single active version of its material.
    #[instrument(skip(self))]
    pub async fn activate_version(
        &self,
        version_id: i64,
    ) -> Result<bom_version::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let version = versions::activate_version(&txn, version_id).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(version)
    }
}
