use chrono::{DateTime, Utc};
use serde_json::Value;

use airt::table::{cell_text, Table};
use airt::util::parse_datetime;

/// "3 days ago", "in 2 hours", ...
pub fn humanize_since(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(then);
    let future = delta.num_seconds() < 0;
    let secs = delta.num_seconds().unsigned_abs();

    let (amount, unit) = match secs {
        0..=59 => (secs, "second"),
        60..=3_599 => (secs / 60, "minute"),
        3_600..=86_399 => (secs / 3_600, "hour"),
        86_400..=2_591_999 => (secs / 86_400, "day"),
        2_592_000..=31_535_999 => (secs / 2_592_000, "month"),
        _ => (secs / 31_536_000, "year"),
    };

    if secs < 10 {
        return "just now".to_string();
    }

    let plural = if amount == 1 { "" } else { "s" };
    if future {
        format!("in {} {}{}", amount, unit, plural)
    } else {
        format!("{} {}{} ago", amount, unit, plural)
    }
}

/// Rewrites timestamp cells of `columns` relative to now; other cells are
/// left alone.
pub fn humanize_dates(table: &mut Table, columns: &[&str]) {
    let now = Utc::now();
    for column in columns {
        table.map_column(column, |value| match value.as_str().and_then(parse_datetime) {
            Some(dt) => Value::String(humanize_since(dt, now)),
            None => value.clone(),
        });
    }
}

/// Fills `{column}` placeholders of `template` from one row.
pub fn format_row(template: &str, columns: &[String], row: &[Value]) -> String {
    columns
        .iter()
        .zip(row)
        .fold(template.to_string(), |line, (column, value)| {
            line.replace(&format!("{{{}}}", column), &cell_text(value))
        })
}

/// Text for a table: the `quiet` column alone, one templated line per row,
/// or the aligned table.
pub fn render(table: &Table, format: Option<&str>, quiet: Option<&str>) -> String {
    if let Some(column) = quiet {
        return table
            .column(column)
            .unwrap_or_default()
            .into_iter()
            .map(|v| format!("{}\n", cell_text(v)))
            .collect();
    }

    match format {
        Some(template) => table
            .rows()
            .iter()
            .map(|row| format!("{}\n", format_row(template, table.columns(), row)))
            .collect(),
        None => table.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn sample() -> Table {
        Table::from_values(
            &[
                json!({"uuid": "k-1", "name": "ci", "created": "2022-04-01T08:00:00"}),
                json!({"uuid": "k-2", "name": "old", "created": null}),
            ],
            &["uuid", "name", "created"],
        )
        .unwrap()
    }

    #[test]
    fn humanized_units() {
        let now = Utc::now();
        assert_eq!(humanize_since(now, now), "just now");
        assert_eq!(humanize_since(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(humanize_since(now - Duration::hours(1), now), "1 hour ago");
        assert_eq!(humanize_since(now - Duration::days(3), now), "3 days ago");
        assert_eq!(humanize_since(now + Duration::days(2), now), "in 2 days");
        assert_eq!(humanize_since(now - Duration::days(800), now), "2 years ago");
    }

    #[test]
    fn humanize_skips_nulls() {
        let mut table = sample();
        humanize_dates(&mut table, &["created"]);
        assert!(table.get(0, "created").unwrap().as_str().unwrap().ends_with("ago"));
        assert_eq!(table.get(1, "created"), Some(&Value::Null));
    }

    #[test]
    fn quiet_prints_single_column() {
        assert_eq!(render(&sample(), None, Some("uuid")), "k-1\nk-2\n");
    }

    #[test]
    fn format_template_per_row() {
        assert_eq!(
            render(&sample(), Some("{name}: {uuid}"), None),
            "ci: k-1\nold: k-2\n"
        );
    }
}
