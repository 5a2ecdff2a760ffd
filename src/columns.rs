//! Torrent table columns and the width solver that fits them to the terminal.

use crate::sort::SortKey;

/// Columns are keyed by the torrent field they display, which is also their sort key.
pub type ColumnKey = SortKey;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub key: ColumnKey,
    pub title: &'static str,
    pub min_width: u16,
    pub max_width: Option<u16>,
    /// Share of leftover width this column takes, in `[0, 1]`.
    pub flex: f32,
    /// Hide order on narrow terminals; 1 is hidden last.
    pub priority: u8,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnWidth {
    pub key: ColumnKey,
    pub width: u16,
}

pub const DEFAULT_VISIBLE: [ColumnKey; 9] = [
    SortKey::Name,
    SortKey::Size,
    SortKey::Progress,
    SortKey::State,
    SortKey::DlSpeed,
    SortKey::UpSpeed,
    SortKey::Eta,
    SortKey::Ratio,
    SortKey::Category,
];

fn spec(
    key: ColumnKey,
    title: &'static str,
    min_width: u16,
    max_width: Option<u16>,
    flex: f32,
    priority: u8,
) -> ColumnSpec {
    ColumnSpec {
        key,
        title,
        min_width,
        max_width,
        flex,
        priority,
        visible: false,
    }
}

pub fn default_columns() -> Vec<ColumnSpec> {
    vec![
        spec(SortKey::Name, "Name", 20, None, 1.0, 1),
        spec(SortKey::Size, "Size", 11, Some(12), 0.0, 3),
        spec(SortKey::Progress, "Done", 8, Some(10), 0.0, 2),
        spec(SortKey::State, "State", 12, Some(20), 0.1, 2),
        spec(SortKey::DlSpeed, "Down", 13, Some(14), 0.0, 3),
        spec(SortKey::UpSpeed, "Up", 13, Some(14), 0.0, 4),
        spec(SortKey::Seeds, "Seeds", 6, Some(8), 0.0, 6),
        spec(SortKey::Peers, "Peers", 6, Some(8), 0.0, 6),
        spec(SortKey::Ratio, "Ratio", 7, Some(8), 0.0, 5),
        spec(SortKey::Eta, "ETA", 8, Some(10), 0.0, 4),
        spec(SortKey::Category, "Category", 10, Some(20), 0.2, 5),
        spec(SortKey::Tags, "Tags", 10, Some(24), 0.2, 7),
        spec(SortKey::Tracker, "Tracker", 14, Some(30), 0.3, 7),
        spec(SortKey::AddedOn, "Added", 17, Some(17), 0.0, 8),
        spec(SortKey::CompletedOn, "Completed", 17, Some(17), 0.0, 8),
        spec(SortKey::SavePath, "Save path", 16, None, 0.3, 9),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSet {
    columns: Vec<ColumnSpec>,
}

impl Default for ColumnSet {
    fn default() -> Self {
        Self::with_visible(&DEFAULT_VISIBLE)
    }
}

impl ColumnSet {
    /// Default columns, with exactly the given keys visible.
    pub fn with_visible(keys: &[ColumnKey]) -> Self {
        let columns = default_columns()
            .into_iter()
            .map(|column| ColumnSpec {
                visible: keys.contains(&column.key),
                ..column
            })
            .collect();
        Self { columns }
    }

    pub fn specs(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn get(&self, index: usize) -> Option<&ColumnSpec> {
        self.columns.get(index)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_visible(&self, key: ColumnKey) -> bool {
        self.columns
            .iter()
            .any(|column| column.key == key && column.visible)
    }

    /// Flips one column's visibility and returns the new value.
    pub fn toggle(&mut self, key: ColumnKey) -> bool {
        let visible = !self.is_visible(key);
        self.set_visible(key, visible);
        visible
    }

    pub fn set_visible(&mut self, key: ColumnKey, visible: bool) {
        if let Some(column) = self.columns.iter_mut().find(|column| column.key == key) {
            column.visible = visible;
        }
    }

    pub fn visible_keys(&self) -> Vec<ColumnKey> {
        self.columns
            .iter()
            .filter(|column| column.visible)
            .map(|column| column.key)
            .collect()
    }

    pub fn layout(&self, available: u16) -> Vec<ColumnWidth> {
        compute(&self.columns, available)
    }
}

/// Picks the visible columns that fit in `available` cells and assigns their widths.
pub fn compute(columns: &[ColumnSpec], available: u16) -> Vec<ColumnWidth> {
    let mut shown: Vec<&ColumnSpec> = columns.iter().filter(|column| column.visible).collect();
    while shown.len() > 1 && total_min(&shown) > u32::from(available) {
        let victim = shown
            .iter()
            .enumerate()
            .max_by_key(|(index, column)| (column.priority, *index))
            .map(|(index, _)| index);
        if let Some(index) = victim {
            shown.remove(index);
        }
    }

    let mut widths: Vec<u16> = shown.iter().map(|column| column.min_width).collect();
    let leftover = u32::from(available).saturating_sub(total_min(&shown));
    distribute(&shown, &mut widths, leftover);

    shown
        .iter()
        .zip(widths)
        .map(|(column, width)| ColumnWidth {
            key: column.key,
            width,
        })
        .collect()
}

fn total_min(columns: &[&ColumnSpec]) -> u32 {
    columns.iter().map(|column| u32::from(column.min_width)).sum()
}

fn distribute(columns: &[&ColumnSpec], widths: &mut [u16], mut leftover: u32) {
    while leftover > 0 {
        let open: Vec<usize> = (0..columns.len())
            .filter(|&index| {
                columns[index].flex > 0.0
                    && columns[index]
                        .max_width
                        .map_or(true, |max| widths[index] < max)
            })
            .collect();
        if open.is_empty() {
            break;
        }

        let total_flex: f64 = open.iter().map(|&index| f64::from(columns[index].flex)).sum();
        let exact: Vec<f64> = open
            .iter()
            .map(|&index| f64::from(leftover) * f64::from(columns[index].flex) / total_flex)
            .collect();
        let mut shares: Vec<u32> = exact.iter().map(|value| value.floor() as u32).collect();

        // Largest remainder first so the shares add up to the leftover exactly.
        let mut order: Vec<usize> = (0..open.len()).collect();
        order.sort_by(|&a, &b| {
            let frac_a = exact[a] - exact[a].floor();
            let frac_b = exact[b] - exact[b].floor();
            frac_b.total_cmp(&frac_a).then(a.cmp(&b))
        });
        let mut remainder = leftover.saturating_sub(shares.iter().sum());
        for &slot in order.iter().cycle() {
            if remainder == 0 {
                break;
            }
            shares[slot] += 1;
            remainder -= 1;
        }

        let mut excess = 0;
        for (slot, &index) in open.iter().enumerate() {
            let grown = u32::from(widths[index]) + shares[slot];
            match columns[index].max_width {
                Some(max) if grown > u32::from(max) => {
                    excess += grown - u32::from(max);
                    widths[index] = max;
                }
                _ => widths[index] = grown as u16,
            }
        }
        leftover = excess;
    }
}
