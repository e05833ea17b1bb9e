use crate::Database;
use crate::models::{
    AppointmentRow, ConsultationRow, FileRow, MessageRow, NewMessage, SummaryRow,
};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

/// Result of an append attempt. The active check and the insert happen in the
/// same write transaction.
pub enum AppendOutcome {
    Appended(MessageRow),
    Missing,
    Inactive,
}

/// How a join found the consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOpen {
    Created,
    Reactivated,
    AlreadyActive,
}

const CONSULTATION_COLUMNS: &str = "appointment_id, patient_id, doctor_id, is_active, started_at, ended_at, last_activity, created_at";

const MESSAGE_COLUMNS: &str = "id, appointment_id, sender_id, sender_role, kind, content, file_url, file_name, file_size, created_at, read, read_at";

impl Database {
    // -- Appointments --

    /// Mirror an appointment written by the scheduling service.
    pub fn upsert_appointment(
        &self,
        id: &str,
        patient_id: &str,
        doctor_id: &str,
        status: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO appointments (id, patient_id, doctor_id, status) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET patient_id = ?2, doctor_id = ?3, status = ?4",
                (id, patient_id, doctor_id, status),
            )?;
            Ok(())
        })
    }

    pub fn get_appointment(&self, id: &str) -> Result<Option<AppointmentRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, patient_id, doctor_id, status FROM appointments WHERE id = ?1",
                [id],
                |row| {
                    Ok(AppointmentRow {
                        id: row.get(0)?,
                        patient_id: row.get(1)?,
                        doctor_id: row.get(2)?,
                        status: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Consultations --

    /// Get-or-create without touching an existing record's activity window.
    /// Returns (row, created).
    pub fn ensure_consultation(
        &self,
        appointment_id: &str,
        patient_id: &str,
        doctor_id: &str,
        now: i64,
    ) -> Result<(ConsultationRow, bool)> {
        self.with_conn(|conn| {
            let inserted = insert_consultation_if_absent(conn, appointment_id, patient_id, doctor_id, now)?;
            let row = query_consultation(conn, appointment_id)?
                .ok_or_else(|| anyhow!("consultation {} vanished after insert", appointment_id))?;
            Ok((row, inserted))
        })
    }

    /// Join-time open: create if absent, reactivate if ended. Returns the
    /// session together with its full message log.
    pub fn open_consultation(
        &self,
        appointment_id: &str,
        patient_id: &str,
        doctor_id: &str,
        now: i64,
    ) -> Result<(ConsultationRow, Vec<MessageRow>, SessionOpen)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let outcome = if insert_consultation_if_absent(&tx, appointment_id, patient_id, doctor_id, now)? {
                SessionOpen::Created
            } else {
                let reactivated = tx.execute(
                    "UPDATE consultations SET is_active = 1, started_at = ?2, ended_at = NULL
                     WHERE appointment_id = ?1 AND is_active = 0",
                    rusqlite::params![appointment_id, now],
                )?;
                if reactivated > 0 {
                    SessionOpen::Reactivated
                } else {
                    SessionOpen::AlreadyActive
                }
            };

            let row = query_consultation(&tx, appointment_id)?
                .ok_or_else(|| anyhow!("consultation {} vanished during open", appointment_id))?;
            let messages = query_messages(&tx, appointment_id)?;
            tx.commit()?;

            Ok((row, messages, outcome))
        })
    }

    pub fn get_consultation(&self, appointment_id: &str) -> Result<Option<ConsultationRow>> {
        self.with_conn(|conn| query_consultation(conn, appointment_id))
    }

    pub fn get_messages(&self, appointment_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, appointment_id))
    }

    /// Flip an active consultation to ended. Returns false if it does not exist;
    /// ending an already ended consultation is a no-op that returns true.
    pub fn end_consultation(&self, appointment_id: &str, now: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE consultations SET is_active = 0, ended_at = ?2
                 WHERE appointment_id = ?1 AND is_active = 1",
                rusqlite::params![appointment_id, now],
            )?;
            if changed > 0 {
                return Ok(true);
            }
            Ok(query_consultation(conn, appointment_id)?.is_some())
        })
    }

    /// Active consultations of a participant, most recently active first,
    /// with the number of unread messages from the other party.
    pub fn active_consultations_for(
        &self,
        participant_id: &str,
        role: &str,
    ) -> Result<Vec<SummaryRow>> {
        let party_column = match role {
            "doctor" => "doctor_id",
            "patient" => "patient_id",
            other => return Err(anyhow!("unknown role '{}'", other)),
        };

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT c.appointment_id, c.patient_id, c.doctor_id, c.is_active, c.started_at, c.last_activity,
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.appointment_id = c.appointment_id
                            AND m.sender_role != ?2
                            AND m.read = 0)
                 FROM consultations c
                 WHERE c.{} = ?1 AND c.is_active = 1
                 ORDER BY c.last_activity DESC",
                party_column
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![participant_id, role], |row| {
                    Ok(SummaryRow {
                        appointment_id: row.get(0)?,
                        patient_id: row.get(1)?,
                        doctor_id: row.get(2)?,
                        is_active: row.get(3)?,
                        started_at: row.get(4)?,
                        last_activity: row.get(5)?,
                        unread_count: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Append a message to an active consultation. The timestamp is never
    /// earlier than the previous message of the same consultation.
    pub fn append_message(
        &self,
        appointment_id: &str,
        msg: &NewMessage,
        now: i64,
    ) -> Result<AppendOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let active: Option<bool> = tx
                .query_row(
                    "SELECT is_active FROM consultations WHERE appointment_id = ?1",
                    [appointment_id],
                    |row| row.get(0),
                )
                .optional()?;
            match active {
                None => return Ok(AppendOutcome::Missing),
                Some(false) => return Ok(AppendOutcome::Inactive),
                Some(true) => {}
            }

            let last: Option<i64> = tx.query_row(
                "SELECT MAX(created_at) FROM messages WHERE appointment_id = ?1",
                [appointment_id],
                |row| row.get(0),
            )?;
            let created_at = last.map_or(now, |prev| prev.max(now));
            let id = Uuid::new_v4().to_string();

            tx.execute(
                "INSERT INTO messages (id, appointment_id, sender_id, sender_role, kind, content, file_url, file_name, file_size, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    id,
                    appointment_id,
                    msg.sender_id,
                    msg.sender_role,
                    msg.kind,
                    msg.content,
                    msg.file_url,
                    msg.file_name,
                    msg.file_size,
                    created_at,
                ],
            )?;
            tx.execute(
                "UPDATE consultations SET last_activity = ?2 WHERE appointment_id = ?1",
                rusqlite::params![appointment_id, created_at],
            )?;
            tx.commit()?;

            Ok(AppendOutcome::Appended(MessageRow {
                id,
                appointment_id: appointment_id.to_string(),
                sender_id: msg.sender_id.clone(),
                sender_role: msg.sender_role.clone(),
                kind: msg.kind.clone(),
                content: msg.content.clone(),
                file_url: msg.file_url.clone(),
                file_name: msg.file_name.clone(),
                file_size: msg.file_size,
                created_at,
                read: false,
                read_at: None,
            }))
        })
    }

    /// Mark every unread message not authored by `reader_id` as read.
    /// Returns how many messages changed.
    /// Flips every unread message sent by the other role. Uses the same
    /// predicate as the unread count in `active_consultations_for`.
    pub fn mark_read(&self, appointment_id: &str, reader_role: &str, now: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read = 1, read_at = ?3
                 WHERE appointment_id = ?1 AND sender_role != ?2 AND read = 0",
                rusqlite::params![appointment_id, reader_role, now],
            )?;
            Ok(changed)
        })
    }

    // -- Files --

    pub fn insert_file(&self, row: &FileRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO files (id, owner_id, file_name, content_type, size, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    row.id,
                    row.owner_id,
                    row.file_name,
                    row.content_type,
                    row.size,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_file(&self, id: &str) -> Result<Option<FileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, owner_id, file_name, content_type, size, created_at FROM files WHERE id = ?1",
                [id],
                |row| {
                    Ok(FileRow {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        file_name: row.get(2)?,
                        content_type: row.get(3)?,
                        size: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()
        })
    }
}

fn insert_consultation_if_absent(
    conn: &Connection,
    appointment_id: &str,
    patient_id: &str,
    doctor_id: &str,
    now: i64,
) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO consultations
            (appointment_id, patient_id, doctor_id, is_active, started_at, last_activity, created_at)
         VALUES (?1, ?2, ?3, 1, ?4, ?4, ?4)",
        rusqlite::params![appointment_id, patient_id, doctor_id, now],
    )?;
    Ok(inserted == 1)
}

fn query_consultation(conn: &Connection, appointment_id: &str) -> Result<Option<ConsultationRow>> {
    let sql = format!(
        "SELECT {} FROM consultations WHERE appointment_id = ?1",
        CONSULTATION_COLUMNS
    );
    conn.query_row(&sql, [appointment_id], |row| {
        Ok(ConsultationRow {
            appointment_id: row.get(0)?,
            patient_id: row.get(1)?,
            doctor_id: row.get(2)?,
            is_active: row.get(3)?,
            started_at: row.get(4)?,
            ended_at: row.get(5)?,
            last_activity: row.get(6)?,
            created_at: row.get(7)?,
        })
    })
    .optional()
}

fn query_messages(conn: &Connection, appointment_id: &str) -> Result<Vec<MessageRow>> {
    let sql = format!(
        "SELECT {} FROM messages WHERE appointment_id = ?1 ORDER BY seq ASC",
        MESSAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map([appointment_id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                appointment_id: row.get(1)?,
                sender_id: row.get(2)?,
                sender_role: row.get(3)?,
                kind: row.get(4)?,
                content: row.get(5)?,
                file_url: row.get(6)?,
                file_name: row.get(7)?,
                file_size: row.get(8)?,
                created_at: row.get(9)?,
                read: row.get(10)?,
                read_at: row.get(11)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
