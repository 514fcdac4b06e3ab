//! MySQL adapter for the staging tables, next to the CRM database.

use super::{
    ActiveMemberRow, AddressMemberRow, FileMakerMemberRow, GiftRow, MandateRow, PersonRow,
    SourceKind, StagingStore,
};
use crate::config::StagingConfig;
use crate::error::{MigrationError, Result};
use async_trait::async_trait;
use chrono::Local;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::time::Duration;
use tracing::{debug, info};

const FILEMAKER_COLUMNS: &str = "lidnummer, is_organisatie, voornaam, achternaam, straat, \
     huisnummer, bus, postcode, gemeente, land, email, telefoon, geslacht, geboortedatum, \
     begindatum, einddatum, afdeling_id";

#[derive(Debug, Clone)]
pub struct MySqlStaging {
    pool: MySqlPool,
    schema: String,
}

impl MySqlStaging {
    pub async fn connect(config: &StagingConfig) -> Result<Self> {
        let schema = validated_schema(&config.schema)?;

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.url)
            .await?;

        info!(
            schema = %schema,
            max_connections = config.max_connections,
            "Staging database pool initialized"
        );

        Ok(Self { pool, schema })
    }

    fn unclaimed_query(&self, source: SourceKind, columns: &str) -> String {
        let flag = source.processed_column();
        format!(
            "SELECT {columns} FROM {}.{} WHERE {flag} IS NULL OR {flag} = 0 ORDER BY {} LIMIT ?",
            self.schema,
            source.table(),
            source.key_column()
        )
    }
}

/// The schema name is interpolated into SQL, so only plain identifiers pass
fn validated_schema(schema: &str) -> Result<String> {
    let valid = !schema.is_empty()
        && schema
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(schema.to_string())
    } else {
        Err(MigrationError::configuration(format!(
            "Invalid staging schema name '{schema}'"
        )))
    }
}

#[async_trait]
impl StagingStore for MySqlStaging {
    async fn address_members(&self, limit: u32) -> Result<Vec<AddressMemberRow>> {
        let sql = self.unclaimed_query(
            SourceKind::AddressMember,
            "lidmaatschap_id, street_name, street_number, street_number_suffix, postal_code, \
             city, country_iso, membership_end_date, afdeling_id, iban, bic",
        );
        let rows = sqlx::query_as::<_, AddressMemberRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        debug!(count = rows.len(), "Fetched address members");
        Ok(rows)
    }

    async fn filemaker_members(&self, source: SourceKind, limit: u32) -> Result<Vec<FileMakerMemberRow>> {
        if !source.is_filemaker_member() {
            return Err(MigrationError::Staging(format!(
                "{source} does not use the FileMaker member layout"
            )));
        }
        let sql = self.unclaimed_query(source, FILEMAKER_COLUMNS);
        let rows = sqlx::query_as::<_, FileMakerMemberRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        debug!(source = %source, count = rows.len(), "Fetched FileMaker members");
        Ok(rows)
    }

    async fn active_members(&self, limit: u32) -> Result<Vec<ActiveMemberRow>> {
        let sql = self.unclaimed_query(SourceKind::Active, "lidnummer, begindatum, einddatum");
        Ok(sqlx::query_as::<_, ActiveMemberRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn mandates(&self, limit: u32) -> Result<Vec<MandateRow>> {
        let sql = self.unclaimed_query(
            SourceKind::Mandate,
            "lidnummer, iban, bic, referentie, datum_mandaat, ingangsdatum, bedrag",
        );
        Ok(sqlx::query_as::<_, MandateRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn gifts(&self, limit: u32) -> Result<Vec<GiftRow>> {
        let sql = self.unclaimed_query(
            SourceKind::Gift,
            "id, lidnummer, bedrag, datum, voornaam, achternaam, omschrijving",
        );
        Ok(sqlx::query_as::<_, GiftRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn mark_processed(&self, source: SourceKind, key: &str) -> Result<()> {
        let sql = match source {
            SourceKind::AddressMember => format!(
                "UPDATE {}.migratie_adres SET migrated = 1, migrate_date = ? WHERE lidmaatschap_id = ?",
                self.schema
            ),
            _ => format!(
                "UPDATE {}.{} SET processed = 1 WHERE {} = ?",
                self.schema,
                source.table(),
                source.key_column()
            ),
        };

        let query = sqlx::query(&sql);
        let query = match source {
            SourceKind::AddressMember => query.bind(Local::now().naive_local()).bind(key),
            _ => query.bind(key),
        };
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn persons_for(&self, lidmaatschap_id: i64) -> Result<Vec<PersonRow>> {
        let sql = format!(
            "SELECT id, lidmaatschap_id, first_name, last_name, gender, birth_date, email, phone, fax \
             FROM {}.migratie_persoon WHERE lidmaatschap_id = ? ORDER BY id",
            self.schema
        );
        Ok(sqlx::query_as::<_, PersonRow>(&sql)
            .bind(lidmaatschap_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_persons(&self, lidmaatschap_id: i64) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}.migratie_persoon WHERE lidmaatschap_id = ?",
            self.schema
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(lidmaatschap_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn record_address_member_outcome(
        &self,
        lidmaatschap_id: i64,
        contact_id: Option<i64>,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {}.migratie_adres SET migrated = 1, migrate_date = ?, contact_id = COALESCE(?, contact_id) \
             WHERE lidmaatschap_id = ?",
            self.schema
        );
        sqlx::query(&sql)
            .bind(Local::now().naive_local())
            .bind(contact_id)
            .bind(lidmaatschap_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_name_must_be_identifier() {
        assert!(validated_schema("velt_migratie_2018").is_ok());
        assert!(validated_schema("velt; DROP TABLE leven").is_err());
        assert!(validated_schema("").is_err());
    }
}
