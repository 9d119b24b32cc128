//! Typed GDB writes and lookups exposed over RPC.

use crate::error::{DbError, Result};
use crate::value::DbValue;
use crate::Gdb;
use chrono::NaiveDateTime;
use serde::Deserialize;
use sqlx::Row;
use tracing::warn;
use wserver_protocol::{PolygonId, RecordId, WriteOutcome};

/// Formats weighing terminals send act times in.
const ACT_TIME_INPUT_FORMATS: &[&str] = &["%Y.%m.%d %H:%M:%S", "%Y.%m.%d %H:%M", "%Y-%m-%d %H:%M:%S"];

/// Format act times are stored in.
const ACT_TIME_STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn default_true() -> bool {
    true
}

// ============================================================================
// Inputs
// ============================================================================

/// New vehicle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewAuto {
    pub car_number: String,
    #[serde(default)]
    pub polygon: Option<PolygonId>,
    /// Identification protocol (rfid, NEG, tails).
    #[serde(default)]
    pub id_type: Option<String>,
    /// Reference tare weight.
    #[serde(default)]
    pub rg_weight: Option<i64>,
    #[serde(default)]
    pub model: Option<i64>,
    /// RFID tag number, resolved to `rfid_id` when the id is not given.
    #[serde(default)]
    pub rfid: Option<String>,
    #[serde(default)]
    pub rfid_id: Option<i64>,
}

/// Weighing act.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewAct {
    pub auto_id: i64,
    pub gross: i64,
    pub tare: i64,
    pub cargo: i64,
    pub time_in: String,
    pub time_out: String,
    #[serde(default)]
    pub carrier_id: Option<i64>,
    #[serde(default)]
    pub trash_cat_id: Option<i64>,
    #[serde(default)]
    pub trash_type_id: Option<i64>,
    #[serde(default)]
    pub polygon_id: Option<i64>,
    #[serde(default)]
    pub operator: Option<i64>,
    /// Record id on the weighing terminal.
    #[serde(default)]
    pub ex_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewNote {
    pub record: RecordId,
    pub note: String,
    #[serde(default)]
    pub note_type: Option<i64>,
}

/// New carrier.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewCompany {
    pub name: String,
    #[serde(default)]
    pub inn: Option<String>,
    #[serde(default)]
    pub kpp: Option<String>,
    #[serde(default)]
    pub polygon: Option<PolygonId>,
    #[serde(default = "default_true")]
    pub status: bool,
    /// Id in an external accounting system.
    #[serde(default)]
    pub ex_id: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewTrashCat {
    pub name: String,
    #[serde(default)]
    pub polygon: Option<PolygonId>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewTrashType {
    pub name: String,
    /// Trash category this type belongs to.
    #[serde(default)]
    pub category: Option<i64>,
    #[serde(default)]
    pub polygon: Option<PolygonId>,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// New weighing operator account.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewOperator {
    pub full_name: String,
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub polygon: Option<PolygonId>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewRfid {
    pub rfid: String,
    #[serde(default)]
    pub rfid_type: Option<i64>,
    #[serde(default)]
    pub owner: Option<i64>,
}

/// Tables rows may be deleted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Auto,
    Records,
    ActPhotos,
    OperatorNotes,
    Companies,
    TrashCats,
    TrashTypes,
    Operators,
    RfidMarks,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Auto => "auto",
            Table::Records => "records",
            Table::ActPhotos => "act_photos",
            Table::OperatorNotes => "operator_notes",
            Table::Companies => "companies",
            Table::TrashCats => "trash_cats",
            Table::TrashTypes => "trash_types",
            Table::Operators => "operators",
            Table::RfidMarks => "rfid_marks",
        }
    }
}

/// Parse an act time in any accepted input format and render it in storage form.
pub fn normalize_act_time(raw: &str) -> Result<String> {
    let raw = raw.trim();
    ACT_TIME_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|time| time.format(ACT_TIME_STORAGE_FORMAT).to_string())
        .ok_or_else(|| DbError::invalid_input(format!("Unrecognized act time: '{}'", raw)))
}

// ============================================================================
// Writes
// ============================================================================

impl Gdb {
    /// Insert a vehicle. A bare `rfid` tag is resolved to its mark id first.
    pub async fn set_auto(&self, auto: &NewAuto) -> WriteOutcome {
        let mut rfid_id = auto.rfid_id;
        if rfid_id.is_none() {
            if let Some(tag) = auto.rfid.as_deref() {
                rfid_id = match self.get_rfid_id(tag).await {
                    Ok(found) => found.map(RecordId::get),
                    Err(e) => {
                        warn!(rfid = %tag, error = %e, "RFID lookup failed; inserting auto without mark");
                        None
                    }
                };
            }
        }

        self.try_execute(
            r#"INSERT INTO auto (car_number, id_type, rg_weight, auto_model, polygon, rfid_id)
               VALUES (?, ?, ?, ?, ?, ?)"#,
            &[
                (&auto.car_number).into(),
                auto.id_type.clone().into(),
                auto.rg_weight.into(),
                auto.model.into(),
                auto.polygon.into(),
                rfid_id.into(),
            ],
        )
        .await
    }

    /// Insert a weighing act. Times are validated and stored normalized.
    pub async fn set_act(&self, act: &NewAct) -> WriteOutcome {
        let (time_in, time_out) = match (
            normalize_act_time(&act.time_in),
            normalize_act_time(&act.time_out),
        ) {
            (Ok(time_in), Ok(time_out)) => (time_in, time_out),
            (Err(e), _) | (_, Err(e)) => {
                warn!(auto_id = act.auto_id, error = %e, "Rejecting act");
                return WriteOutcome::Failure(e.to_string());
            }
        };

        self.try_execute(
            r#"INSERT INTO records
               (car, brutto, tara, cargo, time_in, time_out, carrier,
                trash_cat, trash_type, polygon, operator, ex_id)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            &[
                act.auto_id.into(),
                act.gross.into(),
                act.tare.into(),
                act.cargo.into(),
                time_in.into(),
                time_out.into(),
                act.carrier_id.into(),
                act.trash_cat_id.into(),
                act.trash_type_id.into(),
                act.polygon_id.into(),
                act.operator.into(),
                act.ex_id.into(),
            ],
        )
        .await
    }

    /// Register a stored photo against an act.
    pub async fn add_photo_record(
        &self,
        record: RecordId,
        photo_path: &str,
        photo_type: Option<i64>,
    ) -> WriteOutcome {
        self.try_execute(
            "INSERT INTO act_photos (record, photo_path, photo_type) VALUES (?, ?, ?)",
            &[record.into(), photo_path.into(), photo_type.into()],
        )
        .await
    }

    pub async fn add_operator_notes(&self, note: &NewNote) -> WriteOutcome {
        self.try_execute(
            "INSERT INTO operator_notes (record, note, type) VALUES (?, ?, ?)",
            &[note.record.into(), (&note.note).into(), note.note_type.into()],
        )
        .await
    }

    pub async fn set_company(&self, company: &NewCompany) -> WriteOutcome {
        self.try_execute(
            r#"INSERT INTO companies (name, inn, kpp, ex_id, polygon, status, active)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            &[
                (&company.name).into(),
                company.inn.clone().into(),
                company.kpp.clone().into(),
                company.ex_id.clone().into(),
                company.polygon.into(),
                company.status.into(),
                company.active.into(),
            ],
        )
        .await
    }

    pub async fn set_trash_cat(&self, cat: &NewTrashCat) -> WriteOutcome {
        self.try_execute(
            "INSERT INTO trash_cats (name, polygon, active) VALUES (?, ?, ?)",
            &[(&cat.name).into(), cat.polygon.into(), cat.active.into()],
        )
        .await
    }

    pub async fn set_trash_type(&self, trash_type: &NewTrashType) -> WriteOutcome {
        self.try_execute(
            "INSERT INTO trash_types (name, category, polygon, active) VALUES (?, ?, ?, ?)",
            &[
                (&trash_type.name).into(),
                trash_type.category.into(),
                trash_type.polygon.into(),
                trash_type.active.into(),
            ],
        )
        .await
    }

    pub async fn set_operator(&self, operator: &NewOperator) -> WriteOutcome {
        self.try_execute(
            r#"INSERT INTO operators (full_name, username, password, polygon, active)
               VALUES (?, ?, ?, ?, ?)"#,
            &[
                (&operator.full_name).into(),
                (&operator.login).into(),
                (&operator.password).into(),
                operator.polygon.into(),
                operator.active.into(),
            ],
        )
        .await
    }

    /// Insert an RFID mark. Tag numbers are unique.
    pub async fn add_rfid(&self, mark: &NewRfid) -> WriteOutcome {
        self.try_execute(
            "INSERT INTO rfid_marks (rfid, owner_id, rfid_type) VALUES (?, ?, ?)",
            &[(&mark.rfid).into(), mark.owner.into(), mark.rfid_type.into()],
        )
        .await
    }

    /// Delete one row by id. Returns the number of rows removed.
    pub async fn delete_record(&self, table: Table, id: RecordId) -> Result<u64> {
        let command = format!("DELETE FROM {} WHERE id = ?", table.as_str());
        let done = sqlx::query(&command)
            .bind(id.get())
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }
}

// ============================================================================
// Lookups
// ============================================================================

impl Gdb {
    async fn lookup_id(&self, command: &str, key: &str) -> Result<Option<RecordId>> {
        let rows = self.try_execute_get(command, &[key.into()]).await?;
        Ok(rows
            .first()
            .map(|row| RecordId::new(row.get::<i64, _>("id"))))
    }

    /// Vehicle id by plate number.
    pub async fn get_auto_id(&self, car_number: &str) -> Result<Option<RecordId>> {
        self.lookup_id("SELECT id FROM auto WHERE car_number = ?", car_number)
            .await
    }

    /// Carrier id by name.
    pub async fn get_company_id(&self, name: &str) -> Result<Option<RecordId>> {
        self.lookup_id("SELECT id FROM companies WHERE name = ? ORDER BY id LIMIT 1", name)
            .await
    }

    /// RFID mark id by tag number.
    pub async fn get_rfid_id(&self, rfid: &str) -> Result<Option<RecordId>> {
        self.lookup_id("SELECT id FROM rfid_marks WHERE rfid = ?", rfid)
            .await
    }
}
