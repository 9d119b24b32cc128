//! Polygon directory queries: who receives broadcasts, and where they live.

use crate::error::Result;
use crate::Gdb;
use sqlx::Row;
use wserver_protocol::defaults::BROADCAST_ROLE;
use wserver_protocol::PolygonId;

/// Column of `users` holding a polygon's network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressColumn {
    /// Address the polygon last connected from.
    #[default]
    LastIp,
}

impl AddressColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressColumn::LastIp => "last_ip",
        }
    }
}

impl Gdb {
    /// Polygons enrolled for broadcast, in directory order.
    pub async fn broadcast_polygon_ids(&self) -> Result<Vec<PolygonId>> {
        let rows = self
            .try_execute_get(
                "SELECT polygon FROM duo_polygons WHERE duo_role = ? ORDER BY id",
                &[BROADCAST_ROLE.into()],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| PolygonId::new(row.get::<i64, _>("polygon")))
            .collect())
    }

    /// Network address recorded for `polygon`. Absent rows, NULL and empty
    /// values all come back as `None`.
    pub async fn polygon_address(
        &self,
        polygon: PolygonId,
        column: AddressColumn,
    ) -> Result<Option<String>> {
        let command = format!("SELECT {} AS address FROM users WHERE id = ?", column.as_str());
        let rows = self.try_execute_get(&command, &[polygon.into()]).await?;

        Ok(rows
            .first()
            .and_then(|row| row.get::<Option<String>, _>("address"))
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> Gdb {
        let gdb = Gdb::open_memory().await.unwrap();
        for (polygon, role) in [(3, 1), (5, 2), (9, 1), (14, 1)] {
            let outcome = gdb
                .try_execute(
                    "INSERT INTO duo_polygons (polygon, duo_role) VALUES (?, ?)",
                    &[(polygon as i64).into(), (role as i64).into()],
                )
                .await;
            assert!(outcome.is_success());
        }
        gdb
    }

    #[tokio::test]
    async fn test_broadcast_ids_filter_by_role_in_order() {
        let gdb = seeded().await;
        let ids = gdb.broadcast_polygon_ids().await.unwrap();
        assert_eq!(
            ids,
            vec![PolygonId::new(3), PolygonId::new(9), PolygonId::new(14)]
        );
    }

    #[tokio::test]
    async fn test_polygon_address_lookup() {
        let gdb = Gdb::open_memory().await.unwrap();
        for (id, ip) in [(9, Some("10.0.0.5")), (10, None), (11, Some("  "))] {
            gdb.try_execute(
                "INSERT INTO users (id, last_ip) VALUES (?, ?)",
                &[(id as i64).into(), ip.into()],
            )
            .await;
        }

        let col = AddressColumn::default();
        assert_eq!(
            gdb.polygon_address(PolygonId::new(9), col).await.unwrap(),
            Some("10.0.0.5".to_string())
        );
        assert_eq!(gdb.polygon_address(PolygonId::new(10), col).await.unwrap(), None);
        assert_eq!(gdb.polygon_address(PolygonId::new(11), col).await.unwrap(), None);
        assert_eq!(gdb.polygon_address(PolygonId::new(12), col).await.unwrap(), None);
    }
}
