//! Risk profile operations for the repository.

use crate::domain::{KycStatus, PartyIdentity, RiskLevel, RiskProfile, TimeMs, Verdict};
use sqlx::Row;

use super::{decode_err, parse_enum, Repository};

impl Repository {
    pub async fn get_risk_profile(
        &self,
        person_id: &str,
    ) -> Result<Option<RiskProfile>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT person_id, name, tax_id, risk_level, score, matches, kyc_status,
                   last_assessed_at
            FROM risk_profiles
            WHERE person_id = ?
            "#,
        )
        .bind(person_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let matches_json: String = row.get("matches");
            let matches = serde_json::from_str(&matches_json)
                .map_err(|e| decode_err(format!("matches: {}", e)))?;
            let score: i64 = row.get("score");
            Ok(RiskProfile {
                person_id: row.get("person_id"),
                name: row.get("name"),
                tax_id: row.get("tax_id"),
                risk_level: parse_enum(row.get::<&str, _>("risk_level"))?,
                score: u8::try_from(score).unwrap_or(u8::MAX),
                matches,
                kyc_status: parse_enum(row.get::<&str, _>("kyc_status"))?,
                last_assessed_at: row.get::<Option<i64>, _>("last_assessed_at").map(TimeMs::new),
            })
        })
        .transpose()
    }

    /// Record the outcome of a fresh screen. Last write wins; the KYC status
    /// of an existing profile is preserved.
    pub async fn upsert_risk_assessment(
        &self,
        person: &PartyIdentity,
        verdict: &Verdict,
    ) -> Result<(), sqlx::Error> {
        let matches = serde_json::to_string(&verdict.matches)
            .map_err(|e| decode_err(format!("matches: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO risk_profiles (
                person_id, name, tax_id, risk_level, score, matches, kyc_status, last_assessed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(person_id) DO UPDATE SET
                name = excluded.name,
                tax_id = COALESCE(excluded.tax_id, risk_profiles.tax_id),
                risk_level = excluded.risk_level,
                score = excluded.score,
                matches = excluded.matches,
                last_assessed_at = excluded.last_assessed_at
            "#,
        )
        .bind(person.id.as_str())
        .bind(person.name.as_str())
        .bind(person.tax_id.as_deref())
        .bind(verdict.risk_level.as_str())
        .bind(i64::from(verdict.score))
        .bind(matches)
        .bind(KycStatus::Unverified.as_str())
        .bind(verdict.assessed_at.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Set the KYC status, creating an unassessed profile if none exists.
    pub async fn set_kyc_status(
        &self,
        person: &PartyIdentity,
        status: KycStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO risk_profiles (
                person_id, name, tax_id, risk_level, score, matches, kyc_status, last_assessed_at
            ) VALUES (?, ?, ?, ?, 0, '[]', ?, NULL)
            ON CONFLICT(person_id) DO UPDATE SET
                kyc_status = excluded.kyc_status,
                tax_id = COALESCE(excluded.tax_id, risk_profiles.tax_id)
            "#,
        )
        .bind(person.id.as_str())
        .bind(person.name.as_str())
        .bind(person.tax_id.as_deref())
        .bind(RiskLevel::Clean.as_str())
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
