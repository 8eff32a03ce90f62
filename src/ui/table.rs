use tabled::{Table, Tabled, settings::Style};
use crate::model::{KnownBug, LinkedBug, Pack};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Tabled)]
struct PackRow {
    #[tabled(rename = "Id")]
    id: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Code")]
    code: i64,
    #[tabled(rename = "Min Apk")]
    min_apk: i64,
    #[tabled(rename = "Created")]
    created: String,
}

#[derive(Tabled)]
struct BugRow {
    #[tabled(rename = "Id")]
    id: i64,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Filed")]
    filed: String,
    #[tabled(rename = "Fixed")]
    fixed: String,
    #[tabled(rename = "Here")]
    here: String,
}

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

pub fn packs_table(packs: &[Pack]) -> String {
    let rows: Vec<PackRow> = packs
        .iter()
        .map(|p| PackRow {
            id: p.id,
            name: p.name.clone(),
            version: p.pack_version.clone(),
            code: p.pack_v_code,
            min_apk: p.min_apk_v_code,
            created: p.created_at.format(DATE_FORMAT).to_string(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Bugs linked to one pack; `Here` shows whether the fix reached that pack
pub fn bugs_table(bugs: &[LinkedBug]) -> String {
    let rows: Vec<BugRow> = bugs
        .iter()
        .map(|linked| {
            let KnownBug { id, category, description, filed_on, fixed_on } = &linked.bug;
            BugRow {
                id: *id,
                category: category.clone(),
                description: description.clone(),
                filed: filed_on.format(DATE_FORMAT).to_string(),
                fixed: fixed_on
                    .map(|t| t.format(DATE_FORMAT).to_string())
                    .unwrap_or_else(|| "-".to_string()),
                here: match linked.link.ported_fix_on {
                    Some(t) => format!("fixed {}", t.format(DATE_FORMAT)),
                    None => "open".to_string(),
                },
            }
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}
