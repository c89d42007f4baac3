//! `report`: daily, weekly and monthly usage tables.

use clap::{Parser, ValueEnum};

use super::Error;
use crate::{
    aggregation::Aggregator,
    models::{PeriodSummary, format_bytes},
    persistence::traits::KeyValueStore,
};

/// The bucket size of a report.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportPeriod {
    /// One row per calendar day.
    Daily,
    /// One row per ISO week.
    Weekly,
    /// One row per calendar month.
    Monthly,
}

/// Arguments of the `report` subcommand.
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Bucket size.
    #[arg(value_enum)]
    pub period: ReportPeriod,
    /// Window size: days for daily, weeks or months otherwise.
    #[arg(short, long, default_value_t = 7)]
    pub limit: usize,
    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

/// Builds the report output.
pub async fn execute<T: KeyValueStore>(
    args: &ReportArgs,
    aggregator: &Aggregator<T>,
) -> Result<String, Error> {
    let rows: Vec<PeriodSummary> = match args.period {
        ReportPeriod::Daily => aggregator
            .daily_series(args.limit)
            .await?
            .into_iter()
            .map(PeriodSummary::from)
            .collect(),
        ReportPeriod::Weekly => aggregator.weekly_series(args.limit).await?,
        ReportPeriod::Monthly => aggregator.monthly_series(args.limit).await?,
    };

    if args.json {
        return Ok(serde_json::to_string_pretty(&rows)?);
    }
    Ok(render_table(&rows))
}

/// Renders rows as a plain text table.
pub fn render_table(rows: &[PeriodSummary]) -> String {
    if rows.is_empty() {
        return "No usage recorded.".to_string();
    }

    let mut out = format!(
        "{:<12} {:>9} {:>12} {:>12} {:>12}\n",
        "PERIOD", "DURATION", "RX", "TX", "TOTAL"
    );
    for row in rows {
        out.push_str(&format!(
            "{:<12} {:>9} {:>12} {:>12} {:>12}\n",
            row.period,
            row.totals.duration_formatted(),
            format_bytes(row.totals.rx_bytes),
            format_bytes(row.totals.tx_bytes),
            format_bytes(row.totals.total_bytes()),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::UsageTotals, test_helpers::create_test_store};

    #[test]
    fn test_render_table_empty() {
        assert_eq!(render_table(&[]), "No usage recorded.");
    }

    #[test]
    fn test_render_table_rows() {
        let rows = vec![PeriodSummary {
            period: "2024-W01".to_string(),
            totals: UsageTotals::new(3900, 2048, 1024),
        }];

        let table = render_table(&rows);

        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("2024-W01"));
        assert!(lines[1].contains("1h 5m"));
        assert!(lines[1].contains("2.00 KB"));
        assert!(lines[1].contains("3.00 KB"));
    }

    #[tokio::test]
    async fn test_execute_json_weekly() {
        let store = create_test_store().await;
        store.set_json_state("daily:2024-01-01", &UsageTotals::new(60, 100, 50)).await.unwrap();
        store.set_json_state("daily:2024-01-02", &UsageTotals::new(120, 200, 0)).await.unwrap();
        let aggregator = Aggregator::new(store);
        let args = ReportArgs { period: ReportPeriod::Weekly, limit: 1, json: true };

        let output = execute(&args, &aggregator).await.unwrap();

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{ "period": "2024-W01", "totals": { "d": 180, "rx": 300, "tx": 50 } }])
        );
    }
}
