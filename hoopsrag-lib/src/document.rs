//! Source documents and the normalizer that produces them
//!
//! Two raw input shapes are supported:
//! - Stat tables: comma-separated exports with a header row. A `season`
//!   column and a `player` and/or `team` column are required; every other
//!   column is treated as a stat.
//! - Articles: a header block (`Title:`, `Date:`, optional `Season:`),
//!   a blank line, then the article body.
//!
//! # Usage
//!
//! ```ignore
//! use hoopsrag_lib::document::Normalizer;
//!
//! let normalizer = Normalizer::new(SeasonBounds::default());
//! let docs = normalizer.normalize_file(Path::new("data/assists.csv"))?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::season::{Season, SeasonBounds};
use crate::{Error, Result};

/// The kind of source a document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    StatTable,
    Article,
}

impl DocumentKind {
    /// Declared kind for a file, judged by its extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::StatTable),
            "txt" | "md" => Some(Self::Article),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatTable => f.write_str("stat-table"),
            Self::Article => f.write_str("article"),
        }
    }
}

/// A normalized, immutable source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier
    pub id: String,
    pub kind: DocumentKind,
    /// Season the content belongs to
    pub season: Season,
    /// Article headline, if any
    pub title: Option<String>,
    /// Article publish date, if any
    pub published: Option<NaiveDate>,
    /// Normalized text; rows and paragraphs are newline separated
    pub text: String,
}

impl Document {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        kind: DocumentKind,
        season: Season,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            season,
            title: None,
            published: None,
            text: text.into(),
        }
    }
}

/// Turns raw stat exports and articles into [`Document`]s
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    bounds: SeasonBounds,
}

impl Normalizer {
    #[must_use]
    pub fn new(bounds: SeasonBounds) -> Self {
        Self { bounds }
    }

    /// Reads and normalizes a file whose kind is declared by its extension.
    ///
    /// Documents are identified by the bare file name; use
    /// [`Normalizer::normalize_file_as`] when names can repeat.
    pub fn normalize_file(&self, path: &Path) -> Result<Vec<Document>> {
        let source_id = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        self.normalize_file_as(path, &source_id)
    }

    /// Like [`Normalizer::normalize_file`], with an explicit source id.
    pub fn normalize_file_as(&self, path: &Path, source_id: &str) -> Result<Vec<Document>> {
        let kind = DocumentKind::from_path(path)
            .ok_or_else(|| Error::malformed(source_id, "unsupported file extension"))?;
        let raw = fs::read_to_string(path)?;
        self.normalize(source_id, kind, &raw)
    }

    /// Normalizes raw content of a declared kind.
    pub fn normalize(&self, source_id: &str, kind: DocumentKind, raw: &str) -> Result<Vec<Document>> {
        match kind {
            DocumentKind::StatTable => self.stat_table(source_id, raw),
            DocumentKind::Article => self.article(source_id, raw).map(|doc| vec![doc]),
        }
    }

    /// One document per season found in the table, one line per row.
    pub fn stat_table(&self, source_id: &str, raw: &str) -> Result<Vec<Document>> {
        let mut lines = raw.lines().filter(|l| !l.trim().is_empty());
        let Some(header) = lines.next() else {
            return Ok(Vec::new());
        };

        let columns: Vec<String> = split_record(header)
            .into_iter()
            .map(|c| c.trim().to_ascii_lowercase())
            .collect();
        let position = |name: &str| columns.iter().position(|c| c == name);

        let season_col = position("season")
            .ok_or_else(|| Error::malformed(source_id, "missing required column 'season'"))?;
        let player_col = position("player");
        let team_col = position("team");
        if player_col.is_none() && team_col.is_none() {
            return Err(Error::malformed(
                source_id,
                "missing required column 'player' or 'team'",
            ));
        }

        let mut by_season: BTreeMap<Season, Vec<String>> = BTreeMap::new();
        for (row_no, line) in lines.enumerate() {
            let row_no = row_no + 2;
            let fields = split_record(line);
            if fields.len() != columns.len() {
                return Err(Error::malformed(
                    source_id,
                    format!(
                        "row {row_no} has {} fields, header has {}",
                        fields.len(),
                        columns.len()
                    ),
                ));
            }

            let season = self.season_tag(source_id, fields[season_col].trim())?;
            let cell = |idx: Option<usize>| {
                idx.map(|i| fields[i].trim()).filter(|v| !v.is_empty())
            };
            let subject = match (cell(player_col), cell(team_col)) {
                (Some(player), Some(team)) => format!("{player} ({team})"),
                (Some(player), None) => player.to_string(),
                (None, Some(team)) => team.to_string(),
                (None, None) => {
                    return Err(Error::malformed(
                        source_id,
                        format!("row {row_no} names neither a player nor a team"),
                    ));
                }
            };

            let stats: Vec<String> = columns
                .iter()
                .zip(&fields)
                .enumerate()
                .filter(|(i, _)| ![Some(season_col), player_col, team_col].contains(&Some(*i)))
                .filter(|(_, (_, value))| !value.trim().is_empty())
                .map(|(_, (name, value))| format!("{} {}", name.replace('_', " "), value.trim()))
                .collect();

            by_season
                .entry(season)
                .or_default()
                .push(format!("{subject}, {season} season: {}", stats.join(", ")));
        }

        Ok(by_season
            .into_iter()
            .map(|(season, rows)| {
                Document::new(
                    format!("{source_id}#{season}"),
                    DocumentKind::StatTable,
                    season,
                    rows.join("\n"),
                )
            })
            .collect())
    }

    /// Parses the header block and body of an article.
    pub fn article(&self, source_id: &str, raw: &str) -> Result<Document> {
        let raw = raw.trim_start();
        let (head, body) = match raw.find("\n\n") {
            Some(i) => (&raw[..i], raw[i..].trim()),
            None => (raw, ""),
        };

        let mut title = None;
        let mut date = None;
        let mut season = None;
        for line in head.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "title" => title = Some(value.to_string()),
                "date" => date = Some(value),
                "season" => season = Some(self.season_tag(source_id, value)?),
                _ => {}
            }
        }

        let title = title
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::malformed(source_id, "missing required header 'Title'"))?;
        let date = date.ok_or_else(|| Error::malformed(source_id, "missing required header 'Date'"))?;
        let published = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| Error::malformed(source_id, format!("invalid date '{date}': {e}")))?;
        if body.is_empty() {
            return Err(Error::malformed(source_id, "article body is empty"));
        }

        let season = match season {
            Some(season) => season,
            None => {
                let derived = Season::from_date(published);
                self.check_supported(source_id, derived)?
            }
        };

        Ok(Document {
            id: source_id.to_string(),
            kind: DocumentKind::Article,
            season,
            text: format!("{title}\n\n{body}"),
            title: Some(title),
            published: Some(published),
        })
    }

    fn season_tag(&self, source_id: &str, value: &str) -> Result<Season> {
        let season = value
            .parse::<Season>()
            .map_err(|_| Error::malformed(source_id, format!("invalid season tag '{value}'")))?;
        self.check_supported(source_id, season)
    }

    fn check_supported(&self, source_id: &str, season: Season) -> Result<Season> {
        if self.bounds.contains(season) {
            Ok(season)
        } else {
            Err(Error::malformed(
                source_id,
                format!(
                    "season {season} is outside the supported range {}..={}",
                    self.bounds.lower, self.bounds.upper
                ),
            ))
        }
    }
}

/// Splits one comma-separated record, honouring double-quoted fields.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new(SeasonBounds::default())
    }

    #[test]
    fn test_stat_table_groups_by_season() {
        let raw = "player,team,season,assists_per_game,points\n\
                   Player X,Team Z,2024-25,10.2,21.4\n\
                   Player X,Team Z,2023-24,9.1,19.0\n\
                   Player W,Team Y,2024-25,3.3,\n";
        let docs = normalizer().stat_table("assists.csv", raw).unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "assists.csv#2023-24");
        assert_eq!(docs[1].id, "assists.csv#2024-25");
        assert_eq!(docs[1].kind, DocumentKind::StatTable);
        assert_eq!(
            docs[1].text,
            "Player X (Team Z), 2024-25 season: assists per game 10.2, points 21.4\n\
             Player W (Team Y), 2024-25 season: assists per game 3.3"
        );
    }

    #[test]
    fn test_stat_table_team_only() {
        let raw = "team,season,wins\nTeam Y,2025-26,12\n";
        let docs = normalizer().stat_table("teams.csv", raw).unwrap();
        assert_eq!(docs[0].text, "Team Y, 2025-26 season: wins 12");
    }

    #[test]
    fn test_stat_table_quoted_fields() {
        let raw = "player,season,note\n\"Smith, J.\",2024-25,\"said \"\"hi\"\"\"\n";
        let docs = normalizer().stat_table("q.csv", raw).unwrap();
        assert_eq!(docs[0].text, "Smith, J., 2024-25 season: note said \"hi\"");
    }

    #[test]
    fn test_stat_table_missing_season_column() {
        let err = normalizer()
            .stat_table("bad.csv", "player,points\nX,10\n")
            .unwrap_err();
        assert!(matches!(err, Error::MalformedInput { .. }));
    }

    #[test]
    fn test_stat_table_missing_subject_column() {
        let err = normalizer()
            .stat_table("bad.csv", "season,points\n2024-25,10\n")
            .unwrap_err();
        assert!(matches!(err, Error::MalformedInput { .. }));
    }

    #[test]
    fn test_stat_table_ragged_row() {
        let err = normalizer()
            .stat_table("bad.csv", "player,season,points\nX,2024-25\n")
            .unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_stat_table_unsupported_season() {
        let err = normalizer()
            .stat_table("old.csv", "player,season,points\nX,2015-16,10\n")
            .unwrap_err();
        assert!(err.to_string().contains("outside the supported range"));
    }

    #[test]
    fn test_stat_table_empty_file() {
        assert!(normalizer().stat_table("empty.csv", "").unwrap().is_empty());
    }

    #[test]
    fn test_article_derives_season_from_date() {
        let raw = "Title: Player X traded\nDate: 2024-12-15\n\nPlayer X traded to Team Y in December 2024.";
        let doc = normalizer().article("trade.txt", raw).unwrap();

        assert_eq!(doc.id, "trade.txt");
        assert_eq!(doc.kind, DocumentKind::Article);
        assert_eq!(doc.season, Season::new(2024));
        assert_eq!(doc.title.as_deref(), Some("Player X traded"));
        assert_eq!(
            doc.text,
            "Player X traded\n\nPlayer X traded to Team Y in December 2024."
        );
    }

    #[test]
    fn test_article_explicit_season_wins() {
        let raw = "Title: Preview\nDate: 2025-07-01\nSeason: 2025-26\n\nBody.";
        let doc = normalizer().article("preview.md", raw).unwrap();
        assert_eq!(doc.season, Season::new(2025));
    }

    #[test]
    fn test_article_missing_fields() {
        let n = normalizer();
        assert!(n.article("a.txt", "Date: 2024-12-15\n\nBody").is_err());
        assert!(n.article("a.txt", "Title: T\n\nBody").is_err());
        assert!(n.article("a.txt", "Title: T\nDate: 15/12/2024\n\nBody").is_err());
        assert!(n.article("a.txt", "Title: T\nDate: 2024-12-15\n\n").is_err());
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(
            DocumentKind::from_path(Path::new("a/b.CSV")),
            Some(DocumentKind::StatTable)
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("story.md")),
            Some(DocumentKind::Article)
        );
        assert_eq!(DocumentKind::from_path(Path::new("img.png")), None);
    }
}
