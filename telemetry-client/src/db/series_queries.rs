//! Parameterized SQL for the metric tables.
//!
//! Table and column names are fixed per [`Metric`]; only values are bound.

use crate::domain::Metric;

/// Insert one reading: `$1` device, `$2` timestamp, `$3` rate, `$4` cumulative.
pub const fn insert_sql(metric: Metric) -> &'static str {
    match metric {
        Metric::Electric => {
            r#"INSERT INTO electric_data (device, "timestamp", power_kw, total_kwh) VALUES ($1, $2, $3, $4)"#
        }
        Metric::Water => {
            r#"INSERT INTO water_data (device, "timestamp", flow_lpm, total_l) VALUES ($1, $2, $3, $4)"#
        }
        Metric::Gas => {
            r#"INSERT INTO gas_data (device, "timestamp", flow_m3h, total_m3) VALUES ($1, $2, $3, $4)"#
        }
    }
}

/// Rate samples in `[$1, $2]`, oldest first.
pub const fn range_sql(metric: Metric) -> &'static str {
    match metric {
        Metric::Electric => {
            r#"
            SELECT "timestamp", power_kw AS value
            FROM electric_data
            WHERE "timestamp" BETWEEN $1 AND $2
            ORDER BY "timestamp" ASC
            "#
        }
        Metric::Water => {
            r#"
            SELECT "timestamp", flow_lpm AS value
            FROM water_data
            WHERE "timestamp" BETWEEN $1 AND $2
            ORDER BY "timestamp" ASC
            "#
        }
        Metric::Gas => {
            r#"
            SELECT "timestamp", flow_m3h AS value
            FROM gas_data
            WHERE "timestamp" BETWEEN $1 AND $2
            ORDER BY "timestamp" ASC
            "#
        }
    }
}

/// The newest `$1` rate samples, newest first.
pub const fn latest_sql(metric: Metric) -> &'static str {
    match metric {
        Metric::Electric => {
            r#"SELECT "timestamp", power_kw AS value FROM electric_data ORDER BY "timestamp" DESC LIMIT $1"#
        }
        Metric::Water => {
            r#"SELECT "timestamp", flow_lpm AS value FROM water_data ORDER BY "timestamp" DESC LIMIT $1"#
        }
        Metric::Gas => {
            r#"SELECT "timestamp", flow_m3h AS value FROM gas_data ORDER BY "timestamp" DESC LIMIT $1"#
        }
    }
}

/// Device, timestamp, rate and cumulative value in `[$1, $2]`, oldest first.
pub const fn readings_sql(metric: Metric) -> &'static str {
    match metric {
        Metric::Electric => {
            r#"
            SELECT device, "timestamp", power_kw, total_kwh
            FROM electric_data
            WHERE "timestamp" BETWEEN $1 AND $2
            ORDER BY "timestamp" ASC
            "#
        }
        Metric::Water => {
            r#"
            SELECT device, "timestamp", flow_lpm, total_l
            FROM water_data
            WHERE "timestamp" BETWEEN $1 AND $2
            ORDER BY "timestamp" ASC
            "#
        }
        Metric::Gas => {
            r#"
            SELECT device, "timestamp", flow_m3h, total_m3
            FROM gas_data
            WHERE "timestamp" BETWEEN $1 AND $2
            ORDER BY "timestamp" ASC
            "#
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_use_the_metric_table_and_columns() {
        for metric in Metric::ALL {
            let spec = metric.spec();
            for sql in [insert_sql(metric), range_sql(metric), latest_sql(metric)] {
                assert!(sql.contains(spec.store_table), "{sql}");
                assert!(sql.contains(spec.rate_column), "{sql}");
            }
            assert!(insert_sql(metric).contains(spec.cumulative_column));
            assert!(readings_sql(metric).contains(spec.store_table));
            assert!(readings_sql(metric).contains(spec.rate_column));
            assert!(readings_sql(metric).contains(spec.cumulative_column));
            assert!(readings_sql(metric).contains("$2"));
        }
    }

    #[test]
    fn templates_bind_every_value() {
        for metric in Metric::ALL {
            assert!(insert_sql(metric).contains("$4"));
            assert!(range_sql(metric).contains("$2"));
            assert!(latest_sql(metric).contains("$1"));
        }
    }
}
