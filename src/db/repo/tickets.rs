//! Service ticket and payment ledger operations for the repository.

use crate::domain::{Decimal, LedgerEntry, ServiceTicket, TicketStatus, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{parse_decimal, parse_enum, Repository};

fn ticket_from_row(row: &SqliteRow) -> Result<ServiceTicket, sqlx::Error> {
    Ok(ServiceTicket {
        id: row.get("id"),
        vehicle_id: row.get("vehicle_id"),
        partner_id: row.get("partner_id"),
        customer_id: row.get("customer_id"),
        kind: parse_enum(row.get::<&str, _>("kind"))?,
        scheduled_for: TimeMs::new(row.get("scheduled_for")),
        price: parse_decimal(row.get("price"), "price")?,
        status: parse_enum(row.get::<&str, _>("status"))?,
        partner_payout: parse_decimal(row.get("partner_payout"), "partner_payout")?,
        payout_status: parse_enum(row.get::<&str, _>("payout_status"))?,
        created_at: TimeMs::new(row.get("created_at")),
        updated_at: TimeMs::new(row.get("updated_at")),
    })
}

async fn insert_entry_in(
    conn: &mut sqlx::SqliteConnection,
    entry: &LedgerEntry,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries (id, ticket_id, kind, amount, reference, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.id.as_str())
    .bind(entry.ticket_id.as_str())
    .bind(entry.kind.as_str())
    .bind(entry.amount.to_canonical_string())
    .bind(entry.reference.as_str())
    .bind(entry.created_at.as_ms())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl Repository {
    pub async fn insert_ticket(&self, ticket: &ServiceTicket) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO service_tickets (
                id, vehicle_id, partner_id, customer_id, kind, scheduled_for, price, status,
                partner_payout, payout_status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ticket.id.as_str())
        .bind(ticket.vehicle_id.as_str())
        .bind(ticket.partner_id.as_str())
        .bind(ticket.customer_id.as_str())
        .bind(ticket.kind.as_str())
        .bind(ticket.scheduled_for.as_ms())
        .bind(ticket.price.to_canonical_string())
        .bind(ticket.status.as_str())
        .bind(ticket.partner_payout.to_canonical_string())
        .bind(ticket.payout_status.as_str())
        .bind(ticket.created_at.as_ms())
        .bind(ticket.updated_at.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_ticket(&self, id: &str) -> Result<Option<ServiceTicket>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, vehicle_id, partner_id, customer_id, kind, scheduled_for, price, status,
                   partner_payout, payout_status, created_at, updated_at
            FROM service_tickets
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    /// Record a card charge and move the ticket to `PAID_PENDING_VISIT` with
    /// its partner payout pending.
    ///
    /// Returns false (and writes nothing) unless the ticket is still
    /// `PENDING_PAYMENT`.
    pub async fn charge_ticket(
        &self,
        charge: &LedgerEntry,
        partner_payout: Decimal,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE service_tickets
            SET status = 'PAID_PENDING_VISIT', partner_payout = ?, payout_status = 'PENDING',
                updated_at = ?
            WHERE id = ? AND status = 'PENDING_PAYMENT'
            "#,
        )
        .bind(partner_payout.to_canonical_string())
        .bind(now.as_ms())
        .bind(charge.ticket_id.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_entry_in(&mut tx, charge).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Guarded single-step status move.
    pub async fn advance_ticket(
        &self,
        id: &str,
        from: TicketStatus,
        to: TicketStatus,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE service_tickets SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(now.as_ms())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `IN_PROGRESS → COMPLETED` together with the partner payout entry.
    pub async fn complete_ticket(
        &self,
        payout: &LedgerEntry,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE service_tickets
            SET status = 'COMPLETED', payout_status = 'PAID', updated_at = ?
            WHERE id = ? AND status = 'IN_PROGRESS'
            "#,
        )
        .bind(now.as_ms())
        .bind(payout.ticket_id.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_entry_in(&mut tx, payout).await?;
        tx.commit().await?;
        Ok(true)
    }

    pub async fn ledger_entries(&self, ticket_id: &str) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, ticket_id, kind, amount, reference, created_at
            FROM ledger_entries
            WHERE ticket_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(LedgerEntry {
                    id: row.get("id"),
                    ticket_id: row.get("ticket_id"),
                    kind: parse_enum(row.get::<&str, _>("kind"))?,
                    amount: parse_decimal(row.get("amount"), "amount")?,
                    reference: row.get("reference"),
                    created_at: TimeMs::new(row.get("created_at")),
                })
            })
            .collect()
    }
}
