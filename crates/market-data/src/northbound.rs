//! Northbound-fund homogenization: whatever the upstream returns, the table
//! leaving this module carries exactly six fields with numeric values.

use analysis_core::{Cell, Table};

pub const NORTHBOUND_COLUMNS: &[&str] = &[
    "trade_date",
    "当日成交净买额",
    "买入成交额",
    "卖出成交额",
    "历史累计净买额",
    "当日资金流入",
];

/// Parse strings like "12.3亿", "5,678.9", "1.2 万" into a plain number.
pub fn coerce_cn_number(cell: &Cell) -> Cell {
    let s = match cell {
        Cell::Int(_) | Cell::Float(_) => return cell.clone(),
        Cell::Str(s) => s.trim().replace(' ', ""),
        _ => return Cell::Null,
    };
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return Cell::Null;
    }
    let (digits, multiplier) = if let Some(stripped) = s.strip_suffix('亿') {
        (stripped.to_string(), 1e8)
    } else if let Some(stripped) = s.strip_suffix('万') {
        (stripped.to_string(), 1e4)
    } else {
        (s, 1.0)
    };
    let digits = digits.replace([',', '，'], "");
    match digits.parse::<f64>() {
        Ok(v) => Cell::Float(v * multiplier),
        Err(_) => Cell::Null,
    }
}

/// Candidate source columns per canonical target, exact names first.
fn candidates(target: &str) -> &'static [&'static str] {
    match target {
        "当日成交净买额" => &[
            "当日成交净买额",
            "当日净买额",
            "北向资金-净流入",
            "净流入",
            "净买额",
            "north_net_buy",
            "net_buy",
            "net_amount",
        ],
        "买入成交额" => &["买入成交额", "买入额", "买入成交金额", "buy_value", "buy_amount"],
        "卖出成交额" => &["卖出成交额", "卖出额", "卖出成交金额", "sell_value", "sell_amount"],
        "历史累计净买额" => &[
            "历史累计净买额",
            "历史净买额",
            "累计净买额",
            "north_net_buy_cum",
            "acc_net_buy",
            "cum_net_buy",
        ],
        "当日资金流入" => &[
            "当日资金流入",
            "资金净流入",
            "当日净流入",
            "north_money",
            "north_inflow",
        ],
        _ => &[],
    }
}

fn find_date_column(table: &Table) -> Option<usize> {
    ["trade_date", "日期", "交易日期"]
        .iter()
        .find_map(|c| table.column_index(c))
}

/// Map an arbitrary northbound table to the six canonical fields, coercing
/// Chinese unit suffixes, dropping duplicate dates and sorting ascending.
pub fn homogenize(table: &Table) -> Table {
    let mut out = Table::new(NORTHBOUND_COLUMNS.iter().map(|c| c.to_string()).collect());
    if table.is_empty() {
        return out;
    }

    let date_idx = find_date_column(table);
    let value_indices: Vec<Option<usize>> = NORTHBOUND_COLUMNS[1..]
        .iter()
        .map(|target| {
            candidates(target)
                .iter()
                .find_map(|c| table.column_index(c))
        })
        .collect();

    for row in &table.rows {
        let date = match date_idx {
            Some(i) => normalize_date(&row[i]),
            None => String::new(),
        };
        if date.is_empty() {
            continue;
        }
        let mut cells = vec![Cell::Str(date)];
        for idx in &value_indices {
            cells.push(match idx {
                Some(i) => coerce_cn_number(&row[*i]),
                None => Cell::Null,
            });
        }
        out.push_row(cells);
    }

    out.rows.sort_by(|a, b| a[0].display().cmp(&b[0].display()));
    out.rows.dedup_by(|a, b| a[0].display() == b[0].display());
    out
}

/// Normalize "2025-09-12" / "20250912" date cells to compact form.
fn normalize_date(cell: &Cell) -> String {
    let s = cell.display();
    let compact: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if compact.len() >= 8 {
        compact[..8].to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_suffixes_resolve() {
        assert_eq!(coerce_cn_number(&Cell::Str("12.3亿".into())), Cell::Float(12.3e8));
        assert_eq!(coerce_cn_number(&Cell::Str("1.2 万".into())), Cell::Float(1.2e4));
        assert_eq!(coerce_cn_number(&Cell::Str("5,678.9".into())), Cell::Float(5678.9));
        assert_eq!(coerce_cn_number(&Cell::Str("garbage".into())), Cell::Null);
        assert_eq!(coerce_cn_number(&Cell::Float(3.0)), Cell::Float(3.0));
    }

    #[test]
    fn homogenize_maps_localized_columns() {
        let mut t = Table::new(vec![
            "日期".into(),
            "北向资金-净流入".into(),
            "买入成交额".into(),
            "卖出成交额".into(),
            "历史累计净买额".into(),
        ]);
        t.push_row(vec![
            Cell::Str("2025-09-12".into()),
            Cell::Str("3.5亿".into()),
            Cell::Str("100亿".into()),
            Cell::Str("96.5亿".into()),
            Cell::Str("1.8万".into()),
        ]);
        let out = homogenize(&t);
        assert_eq!(out.columns, NORTHBOUND_COLUMNS);
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows[0][0].display(), "20250912");
        assert_eq!(out.rows[0][1], Cell::Float(3.5e8));
        // 当日资金流入 missing upstream → null, still present as a column.
        assert_eq!(out.rows[0][5], Cell::Null);
    }

    #[test]
    fn duplicate_dates_collapse_and_sort() {
        let mut t = Table::new(vec!["trade_date".into(), "net_buy".into()]);
        t.push_row(vec![Cell::Str("20250912".into()), Cell::Float(2.0)]);
        t.push_row(vec![Cell::Str("20250910".into()), Cell::Float(1.0)]);
        t.push_row(vec![Cell::Str("20250912".into()), Cell::Float(3.0)]);
        let out = homogenize(&t);
        assert_eq!(out.len(), 2);
        assert_eq!(out.rows[0][0].display(), "20250910");
    }
}
