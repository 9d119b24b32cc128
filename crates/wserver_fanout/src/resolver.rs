//! Destination resolution.
//!
//! Directory reads are made fresh for every request; nothing is cached.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use wserver_db::{AddressColumn, Gdb};
use wserver_protocol::PolygonId;

/// Source of polygon ids and addresses.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Every polygon enrolled for broadcast, in directory order.
    async fn broadcast_polygons(&self) -> wserver_db::Result<Vec<PolygonId>>;

    /// Address stored for `polygon` in `column`.
    async fn polygon_address(
        &self,
        polygon: PolygonId,
        column: AddressColumn,
    ) -> wserver_db::Result<Option<String>>;
}

#[async_trait]
impl Directory for Gdb {
    async fn broadcast_polygons(&self) -> wserver_db::Result<Vec<PolygonId>> {
        self.broadcast_polygon_ids().await
    }

    async fn polygon_address(
        &self,
        polygon: PolygonId,
        column: AddressColumn,
    ) -> wserver_db::Result<Option<String>> {
        Gdb::polygon_address(self, polygon, column).await
    }
}

/// A polygon and where to reach it, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub polygon: PolygonId,
    pub address: Option<String>,
}

#[derive(Clone)]
pub struct NodeResolver {
    directory: Arc<dyn Directory>,
    column: AddressColumn,
}

impl NodeResolver {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self {
            directory,
            column: AddressColumn::default(),
        }
    }

    pub fn with_column(mut self, column: AddressColumn) -> Self {
        self.column = column;
        self
    }

    /// The explicit polygon alone, or every broadcast polygon when none is given.
    pub async fn resolve_destinations(&self, explicit: Option<PolygonId>) -> Vec<PolygonId> {
        if let Some(polygon) = explicit {
            return vec![polygon];
        }
        match self.directory.broadcast_polygons().await {
            Ok(polygons) => {
                debug!(count = polygons.len(), "Resolved broadcast polygons");
                polygons
            }
            Err(e) => {
                warn!(error = %e, "Broadcast directory query failed; nothing will be propagated");
                Vec::new()
            }
        }
    }

    /// Address of `polygon`, or `None` when it cannot be determined.
    pub async fn resolve_address(&self, polygon: PolygonId) -> Option<String> {
        match self.directory.polygon_address(polygon, self.column).await {
            Ok(address) => address,
            Err(e) => {
                warn!(%polygon, error = %e, "Address lookup failed");
                None
            }
        }
    }

    pub async fn resolve(&self, polygon: PolygonId) -> Destination {
        Destination {
            polygon,
            address: self.resolve_address(polygon).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wserver_db::DbError;

    struct FailingDirectory;

    #[async_trait]
    impl Directory for FailingDirectory {
        async fn broadcast_polygons(&self) -> wserver_db::Result<Vec<PolygonId>> {
            Err(DbError::not_found("duo_polygons"))
        }

        async fn polygon_address(
            &self,
            _polygon: PolygonId,
            _column: AddressColumn,
        ) -> wserver_db::Result<Option<String>> {
            Err(DbError::not_found("users"))
        }
    }

    #[tokio::test]
    async fn test_explicit_destination_skips_directory() {
        let resolver = NodeResolver::new(Arc::new(FailingDirectory));
        let ids = resolver.resolve_destinations(Some(PolygonId::new(9))).await;
        assert_eq!(ids, vec![PolygonId::new(9)]);
    }

    #[tokio::test]
    async fn test_directory_errors_degrade_to_nothing() {
        let resolver = NodeResolver::new(Arc::new(FailingDirectory));
        assert!(resolver.resolve_destinations(None).await.is_empty());
        assert_eq!(resolver.resolve_address(PolygonId::new(9)).await, None);
    }

    #[tokio::test]
    async fn test_gdb_directory() {
        let gdb = Gdb::open_memory().await.unwrap();
        gdb.try_execute(
            "INSERT INTO duo_polygons (polygon, duo_role) VALUES (?, ?)",
            &[9i64.into(), 1i64.into()],
        )
        .await;
        gdb.try_execute(
            "INSERT INTO users (id, last_ip) VALUES (?, ?)",
            &[9i64.into(), "10.0.0.5".into()],
        )
        .await;

        let resolver = NodeResolver::new(Arc::new(gdb));
        assert_eq!(resolver.resolve_destinations(None).await, vec![PolygonId::new(9)]);
        assert_eq!(
            resolver.resolve(PolygonId::new(9)).await,
            Destination {
                polygon: PolygonId::new(9),
                address: Some("10.0.0.5".to_string()),
            }
        );
    }
}
