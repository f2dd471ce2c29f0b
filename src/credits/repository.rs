//! Credit Repository
//! Mission: Look up credits by invoice number or credit number

use crate::credits::models::Credit;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use tracing::info;

/// Read side of credit persistence
pub trait CreditRepository: Send + Sync {
    /// All credits constituted from the given service invoice
    fn find_by_invoice(&self, invoice_number: &str) -> Result<Vec<Credit>>;

    fn find_by_credit_number(&self, credit_number: &str) -> Result<Option<Credit>>;
}

const DATE_FORMAT: &str = "%Y-%m-%d";

const SELECT_COLUMNS: &str = "SELECT credit_number, invoice_number, constitution_date, issqn_amount,
        credit_type, simples_nacional, rate, billed_amount, deduction_amount, calculation_base
     FROM credits";

/// Credit storage with SQLite backend
pub struct SqliteCreditRepository {
    db_path: String,
}

impl SqliteCreditRepository {
    pub fn new(db_path: &str) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_string(),
        };
        repo.init_db()?;
        Ok(repo)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open credit database at {}", self.db_path))
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS credits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                credit_number TEXT UNIQUE NOT NULL,
                invoice_number TEXT NOT NULL,
                constitution_date TEXT NOT NULL,
                issqn_amount REAL NOT NULL,
                credit_type TEXT NOT NULL,
                simples_nacional INTEGER NOT NULL,
                rate REAL NOT NULL,
                billed_amount REAL NOT NULL,
                deduction_amount REAL NOT NULL,
                calculation_base REAL NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_credits_invoice ON credits(invoice_number)",
            [],
        )?;

        Ok(())
    }

    /// Insert or replace a credit (keyed by credit number)
    pub fn upsert(&self, credit: &Credit) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR REPLACE INTO credits (credit_number, invoice_number, constitution_date,
                issqn_amount, credit_type, simples_nacional, rate, billed_amount,
                deduction_amount, calculation_base)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                credit.credit_number,
                credit.invoice_number,
                credit.constitution_date.format(DATE_FORMAT).to_string(),
                credit.issqn_amount,
                credit.credit_type,
                credit.simples_nacional,
                credit.rate,
                credit.billed_amount,
                credit.deduction_amount,
                credit.calculation_base,
            ],
        )
        .context("Failed to insert credit")?;
        Ok(())
    }

    /// Seed a small demo data set
    pub fn seed_demo(&self) -> Result<usize> {
        let credits = demo_credits();
        for credit in &credits {
            self.upsert(credit)?;
        }
        info!(count = credits.len(), "🌱 Seeded demo credits");
        Ok(credits.len())
    }

    fn row_to_credit(row: &Row<'_>) -> rusqlite::Result<Credit> {
        let date: String = row.get(2)?;
        let constitution_date = NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Credit {
            credit_number: row.get(0)?,
            invoice_number: row.get(1)?,
            constitution_date,
            issqn_amount: row.get(3)?,
            credit_type: row.get(4)?,
            simples_nacional: row.get(5)?,
            rate: row.get(6)?,
            billed_amount: row.get(7)?,
            deduction_amount: row.get(8)?,
            calculation_base: row.get(9)?,
        })
    }
}

impl CreditRepository for SqliteCreditRepository {
    fn find_by_invoice(&self, invoice_number: &str) -> Result<Vec<Credit>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE invoice_number = ?1 ORDER BY credit_number",
            SELECT_COLUMNS
        ))?;

        let credits = stmt
            .query_map(params![invoice_number], Self::row_to_credit)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read credits by invoice")?;

        Ok(credits)
    }

    fn find_by_credit_number(&self, credit_number: &str) -> Result<Option<Credit>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!("{} WHERE credit_number = ?1", SELECT_COLUMNS))?;

        let mut rows = stmt.query_map(params![credit_number], Self::row_to_credit)?;
        rows.next()
            .transpose()
            .context("Failed to read credit by number")
    }
}

/// Process-local repository, for tests and demos
#[derive(Default)]
pub struct InMemoryCreditRepository {
    credits: Vec<Credit>,
}

impl InMemoryCreditRepository {
    pub fn new(credits: Vec<Credit>) -> Self {
        Self { credits }
    }
}

impl CreditRepository for InMemoryCreditRepository {
    fn find_by_invoice(&self, invoice_number: &str) -> Result<Vec<Credit>> {
        Ok(self
            .credits
            .iter()
            .filter(|c| c.invoice_number == invoice_number)
            .cloned()
            .collect())
    }

    fn find_by_credit_number(&self, credit_number: &str) -> Result<Option<Credit>> {
        Ok(self
            .credits
            .iter()
            .find(|c| c.credit_number == credit_number)
            .cloned())
    }
}

fn demo_credit(
    credit_number: &str,
    invoice_number: &str,
    (y, m, d): (i32, u32, u32),
    billed_amount: f64,
    deduction_amount: f64,
    rate: f64,
    simples_nacional: bool,
) -> Option<Credit> {
    let calculation_base = billed_amount - deduction_amount;
    Some(Credit {
        credit_number: credit_number.to_string(),
        invoice_number: invoice_number.to_string(),
        constitution_date: NaiveDate::from_ymd_opt(y, m, d)?,
        issqn_amount: (calculation_base * rate / 100.0 * 100.0).round() / 100.0,
        credit_type: "ISSQN".to_string(),
        simples_nacional,
        rate,
        billed_amount,
        deduction_amount,
        calculation_base,
    })
}

/// Demo data set: two credits on one invoice, one on another
pub fn demo_credits() -> Vec<Credit> {
    [
        demo_credit("123456", "7891011", (2024, 2, 25), 30000.0, 5000.0, 5.0, true),
        demo_credit("789012", "7891011", (2024, 2, 26), 25000.0, 4000.0, 4.5, false),
        demo_credit("654321", "1122334", (2024, 1, 15), 20000.0, 3000.0, 3.5, true),
    ]
    .into_iter()
    .flatten()
    .collect()
}
