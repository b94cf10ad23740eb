//! Category mix for the latest month, plus the local fallback summary and what-if projection.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use crate::analysis::{format_short_pct, format_usd};
use crate::models::{HistoryRow, StoreId};

pub const OTHER_KEY: &str = "__OTHER__";
const MAX_LABEL_CHARS: usize = 26;
const TRUNCATED_LABEL_CHARS: usize = 23;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CategoryValue {
    pub name: String,
    pub value: f64,
}

/// One bar of the chart. `share` is a fraction of the month's category total.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CategorySlice {
    pub name: String,
    pub label: String,
    pub value: f64,
    pub share: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct CategoryTotals {
    pub grand_total: f64,
    pub top_total: f64,
    pub other_total: f64,
}

/// Body of `POST insights/category-breakdown`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CategoryInsightPayload {
    pub store_id: Option<StoreId>,
    pub month: String,
    pub top_n: usize,
    pub totals: CategoryTotals,
    /// Every category of the month, largest first.
    pub categories: Vec<CategoryValue>,
    pub prev_categories: Option<Vec<CategoryValue>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryBreakdown {
    /// YYYY-MM
    pub month: String,
    pub slices: Vec<CategorySlice>,
    pub payload: CategoryInsightPayload,
}

/// Build the breakdown from the most recent history row that carries categories, compared with
/// the one before it. `None` when no row has categories.
pub fn build_breakdown(history: &[HistoryRow], top_n: usize, store_id: Option<StoreId>) -> Option<CategoryBreakdown> {
    let mut rows: Vec<&HistoryRow> = history.iter().collect();
    rows.sort_by(|a, b| a.date.cmp(&b.date));

    // 1. Latest and previous rows with categories
    let mut with_categories = rows
        .iter()
        .rev()
        .filter_map(|r| r.categories.as_ref().filter(|c| !c.is_empty()).map(|c| (*r, c)));
    let (latest_row, latest_categories) = with_categories.next()?;
    let prev = with_categories.next().map(|(_, c)| category_values(c));

    // 2. Sort desc and keep Top N + Other
    let mut entries = category_values(latest_categories);
    entries.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(std::cmp::Ordering::Equal));
    let month_sum: f64 = entries.iter().map(|e| e.value).sum();

    let keep = top_n.max(1).min(entries.len());
    let (top, rest) = entries.split_at(keep);
    let share = |v: f64| if month_sum != 0.0 { v / month_sum } else { 0.0 };

    let mut slices: Vec<CategorySlice> = top
        .iter()
        .map(|e| CategorySlice {
            name: e.name.clone(),
            label: tidy_label(&e.name),
            value: e.value,
            share: share(e.value),
        })
        .collect();
    let top_total: f64 = top.iter().map(|e| e.value).sum();
    let other_total: f64 = rest.iter().map(|e| e.value).sum();
    if !rest.is_empty() {
        slices.push(CategorySlice {
            name: OTHER_KEY.to_string(),
            label: "Other".to_string(),
            value: other_total,
            share: share(other_total),
        });
    }

    // 3. Payload for the insight endpoint
    let month = to_year_month(&latest_row.date);
    let payload = CategoryInsightPayload {
        store_id,
        month: month.clone(),
        top_n,
        totals: CategoryTotals { grand_total: month_sum, top_total, other_total },
        categories: entries.clone(),
        prev_categories: prev,
    };

    Some(CategoryBreakdown { month, slices, payload })
}

/// "Total" rows are dropped. Unparsable values count as 0 and stay in the list.
fn category_values(categories: &BTreeMap<String, f64>) -> Vec<CategoryValue> {
    categories
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("total"))
        .map(|(name, v)| CategoryValue {
            name: name.clone(),
            value: if v.is_finite() { *v } else { 0.0 },
        })
        .collect()
}

fn to_year_month(date: &str) -> String {
    let head: String = date.chars().take(10).collect();
    match NaiveDate::parse_from_str(&head, "%Y-%m-%d") {
        Ok(d) => d.format("%Y-%m").to_string(),
        Err(_) => date.to_string(),
    }
}

/// "AMERICAN_CORDIALS_LIQUEURS" -> "American Cordials Liqueurs", shortened past 26 chars.
pub fn tidy_label(raw: &str) -> String {
    let spaced = raw.replace('_', " ").to_lowercase();
    let spaced = spaced.split(" & ").map(str::trim).collect::<Vec<_>>().join(" & ");

    let mut out = String::with_capacity(spaced.len());
    let mut prev_is_word = false;
    for ch in spaced.chars() {
        let is_word = ch.is_alphanumeric();
        if is_word && !prev_is_word {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        prev_is_word = is_word;
    }

    if out.chars().count() > MAX_LABEL_CHARS {
        let mut short: String = out.chars().take(TRUNCATED_LABEL_CHARS).collect();
        short.push('…');
        short
    } else {
        out
    }
}

/// Local summary used when the category insight endpoint fails or answers with no text.
pub fn summarize_categories(payload: &CategoryInsightPayload) -> String {
    let total = payload.totals.grand_total;
    let pct_of_total = |v: f64| if total != 0.0 { v / total * 100.0 } else { 0.0 };

    let mut sorted = payload.categories.clone();
    sorted.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(std::cmp::Ordering::Equal));
    let top3 = &sorted[..sorted.len().min(3)];

    let mut lines = vec![format!("Category breakdown for {}.", payload.month)];
    for (i, c) in top3.iter().enumerate() {
        lines.push(format!(
            "{}. {}: {} ({:.1}%).",
            i + 1,
            tidy_label(&c.name),
            format_usd(c.value),
            pct_of_total(c.value)
        ));
    }
    let top3_sum: f64 = top3.iter().map(|c| c.value).sum();
    lines.push(format!("Concentration: top 3 = {:.1}% of category sales.", pct_of_total(top3_sum)));

    if let Some(prev) = payload.prev_categories.as_ref().filter(|p| !p.is_empty()) {
        let prev_map: HashMap<&str, f64> = prev.iter().map(|p| (p.name.as_str(), p.value)).collect();
        let mut best: Option<(&str, f64)> = None;
        for c in &payload.categories {
            let delta = c.value - prev_map.get(c.name.as_str()).copied().unwrap_or(0.0);
            if delta.abs() > best.map(|(_, d)| d.abs()).unwrap_or(0.0) {
                best = Some((c.name.as_str(), delta));
            }
        }
        if let Some((name, delta)) = best {
            lines.push(format!(
                "Biggest mover vs prior month: {} {} {} (~{}%).",
                tidy_label(name),
                if delta >= 0.0 { "up" } else { "down" },
                format_usd(delta.abs()),
                format_short_pct(pct_of_total(delta.abs()))
            ));
        }
    }

    lines.push(format!("Total across categories: {}.", format_usd(total)));
    lines.join("\n")
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WhatIfRow {
    pub name: String,
    pub value: f64,
    pub delta_pct: f64,
    pub what_if_value: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WhatIfProjection {
    pub rows: Vec<WhatIfRow>,
    pub total: f64,
    pub total_what_if: f64,
    pub delta_abs: f64,
    pub delta_pct: f64,
}

/// Apply per-category percentage changes (`{"WINE": 10.0}` is +10%). Missing names stay flat.
pub fn project_what_if(categories: &[CategoryValue], deltas: &HashMap<String, f64>) -> WhatIfProjection {
    let rows: Vec<WhatIfRow> = categories
        .iter()
        .map(|c| {
            let delta_pct = deltas.get(&c.name).copied().unwrap_or(0.0);
            WhatIfRow {
                name: c.name.clone(),
                value: c.value,
                delta_pct,
                what_if_value: c.value * (1.0 + delta_pct / 100.0),
            }
        })
        .collect();

    let total: f64 = rows.iter().map(|r| r.value).sum();
    let total_what_if: f64 = rows.iter().map(|r| r.what_if_value).sum();
    let delta_abs = total_what_if - total;
    let delta_pct = if total != 0.0 { delta_abs / total * 100.0 } else { 0.0 };

    WhatIfProjection { rows, total, total_what_if, delta_abs, delta_pct }
}
