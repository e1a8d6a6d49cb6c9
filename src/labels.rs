use std::collections::HashMap;
use std::path::Path;

use crate::error::ConfigError;
use crate::threshold::Thresholds;

const KAOMOJIS: &[&str] = &[
    "0_0", "(o)_(o)", "+_+", "+_-", "._.", "<o>_<o>", "<|>_<|>", "=_=", ">_<", "3_3", "6_9", ">_o",
    "@_@", "^_^", "o_o", "u_u", "x_x", "|_|", "||_||",
];
const RATING: &str = "9";
const GENERAL: &str = "0";
const CHARACTER: &str = "4";

/// Category of one output position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Rating,
    General,
    Character,
    /// Tags in any other category are never reported.
    None,
}

impl Category {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            RATING => Self::Rating,
            GENERAL => Self::General,
            CHARACTER => Self::Character,
            _ => Self::None,
        }
    }
}

#[derive(serde::Deserialize)]
struct Label {
    name: String,
    category: String,
}

/// Tag names and categories, index-aligned with the model output vector.
#[derive(Clone, Debug, Default)]
pub struct TagCatalog {
    names: Vec<String>,
    categories: Vec<Category>,
    rating_indices: Vec<usize>,
    general_indices: Vec<usize>,
    character_indices: Vec<usize>,
}

/// Underscores become spaces, except inside known kaomojis.
pub fn normalize_name(name: &str) -> String {
    if KAOMOJIS.contains(&name) {
        name.to_string()
    } else {
        name.replace('_', " ")
    }
}

impl TagCatalog {
    /// Read a tag CSV with `name` and `category` columns.
    pub fn from_csv<P: AsRef<Path>>(csv_path: P) -> Result<Self, ConfigError> {
        let path = csv_path.as_ref();
        let tags_error = |source| ConfigError::Tags {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::Reader::from_path(path).map_err(tags_error)?;
        let labels = reader
            .deserialize()
            .map(|result| result.map(|label: Label| (label.name, label.category)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(tags_error)?;

        let catalog = Self::from_records(labels);
        tracing::debug!(
            "Loaded {} tags from {:?} (rating: {}, general: {}, character: {})",
            catalog.len(),
            path,
            catalog.rating_indices.len(),
            catalog.general_indices.len(),
            catalog.character_indices.len(),
        );
        Ok(catalog)
    }

    /// Build from `(name, category code)` pairs in output order.
    pub fn from_records<I, N, C>(records: I) -> Self
    where
        I: IntoIterator<Item = (N, C)>,
        N: AsRef<str>,
        C: AsRef<str>,
    {
        let mut catalog = Self::default();
        for (i, (name, code)) in records.into_iter().enumerate() {
            let category = Category::from_code(code.as_ref());
            match category {
                Category::Rating => catalog.rating_indices.push(i),
                Category::General => catalog.general_indices.push(i),
                Category::Character => catalog.character_indices.push(i),
                Category::None => {}
            }
            catalog.names.push(normalize_name(name.as_ref()));
            catalog.categories.push(category);
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn category(&self, index: usize) -> Category {
        self.categories.get(index).copied().unwrap_or(Category::None)
    }

    pub fn rating_indices(&self) -> &[usize] {
        &self.rating_indices
    }

    pub fn general_indices(&self) -> &[usize] {
        &self.general_indices
    }

    pub fn character_indices(&self) -> &[usize] {
        &self.character_indices
    }

    /// Split one image's score vector into thresholded predictions.
    pub fn analyze(&self, preds: &[f32], thresholds: &Thresholds) -> Predictions {
        let general_threshold = thresholds.general_for(&gather(preds, &self.general_indices));
        let character_threshold =
            thresholds.character_for(&gather(preds, &self.character_indices));

        let mut predictions = Predictions::default();
        for ((name, category), &score) in self.names.iter().zip(&self.categories).zip(preds) {
            match category {
                Category::Rating => {
                    predictions.rating.insert(name.clone(), score);
                }
                Category::General if score > general_threshold => {
                    predictions.general.insert(name.clone(), score);
                }
                Category::Character if score > character_threshold => {
                    predictions.character.insert(name.clone(), score);
                }
                _ => {}
            }
        }
        predictions
    }
}

fn gather(preds: &[f32], indices: &[usize]) -> Vec<f32> {
    indices.iter().filter_map(|&i| preds.get(i).copied()).collect()
}

/// Tags predicted for one image.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Predictions {
    /// Every rating tag with its raw score.
    pub rating: HashMap<String, f32>,
    /// General tags above the general threshold.
    pub general: HashMap<String, f32>,
    /// Character tags above the character threshold.
    pub character: HashMap<String, f32>,
}

pub type TagScores<'a> = Vec<(&'a str, f32)>;

fn sorted(scores: &HashMap<String, f32>) -> TagScores<'_> {
    let mut tags: Vec<_> = scores.iter().map(|(t, &p)| (t.as_str(), p)).collect();
    tags.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    tags
}

impl Predictions {
    /// General tag names, highest score first.
    pub fn general_names(&self) -> Vec<&str> {
        sorted(&self.general).into_iter().map(|(t, _)| t).collect()
    }

    /// General then character tags, each highest score first.
    pub fn tags(&self) -> TagScores<'_> {
        let mut tags = sorted(&self.general);
        tags.extend(sorted(&self.character));
        tags
    }

    /// The most likely rating.
    pub fn rating(&self) -> Option<(&str, f32)> {
        sorted(&self.rating).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn catalog() -> TagCatalog {
        TagCatalog::from_records([
            ("general", "9"),
            ("sensitive", "9"),
            ("long_hair", "0"),
            ("^_^", "0"),
            ("smile", "0"),
            ("hatsune_miku", "4"),
            ("artist_name", "1"),
        ])
    }

    #[test]
    fn test_categories_and_names() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 7);
        assert_eq!(catalog.rating_indices(), [0, 1]);
        assert_eq!(catalog.general_indices(), [2, 3, 4]);
        assert_eq!(catalog.character_indices(), [5]);
        assert_eq!(catalog.category(6), Category::None);
        assert_eq!(catalog.category(100), Category::None);
        assert_eq!(catalog.name(2), Some("long hair"));
        assert_eq!(catalog.name(3), Some("^_^"));
        assert_eq!(catalog.name(5), Some("hatsune miku"));
    }

    #[test]
    fn test_categories_are_exclusive() {
        let catalog = catalog();
        for &i in catalog.general_indices() {
            assert!(!catalog.rating_indices().contains(&i));
            assert!(!catalog.character_indices().contains(&i));
        }
        for &i in catalog.rating_indices() {
            assert!(!catalog.character_indices().contains(&i));
        }
    }

    #[test]
    fn test_all_kaomojis_kept() {
        for kaomoji in KAOMOJIS {
            assert_eq!(normalize_name(kaomoji), *kaomoji);
        }
        assert_eq!(normalize_name("a_b_c"), "a b c");
    }

    #[test]
    fn test_from_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tag_id,name,category,count").unwrap();
        writeln!(file, "9999999,general,9,807691").unwrap();
        writeln!(file, "470575,1girl,0,4225150").unwrap();
        writeln!(file, "212816,solo,0,3442196").unwrap();
        writeln!(file, "1,x_x,0,10").unwrap();
        writeln!(file, "2,kirisame_marisa,4,10").unwrap();
        file.flush().unwrap();

        let catalog = TagCatalog::from_csv(file.path()).unwrap();
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.rating_indices(), [0]);
        assert_eq!(catalog.general_indices(), [1, 2, 3]);
        assert_eq!(catalog.character_indices(), [4]);
        assert_eq!(catalog.name(3), Some("x_x"));
        assert_eq!(catalog.name(4), Some("kirisame marisa"));
    }

    #[test]
    fn test_from_csv_missing_file() {
        let err = TagCatalog::from_csv("/nonexistent/selected_tags.csv").unwrap_err();
        assert!(matches!(err, ConfigError::Tags { .. }));
    }

    #[test]
    fn test_from_csv_missing_column() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tag_id,name").unwrap();
        writeln!(file, "1,solo").unwrap();
        file.flush().unwrap();

        assert!(TagCatalog::from_csv(file.path()).is_err());
    }

    #[test]
    fn test_analyze_fixed_thresholds() {
        let catalog = TagCatalog::from_records([("safe", "9"), ("smile", "0"), ("miku", "4")]);
        let predictions = catalog.analyze(&[0.8, 0.5, 0.9], &Thresholds::default());

        assert_eq!(predictions.rating, HashMap::from([("safe".to_string(), 0.8)]));
        assert_eq!(predictions.general, HashMap::from([("smile".to_string(), 0.5)]));
        assert_eq!(predictions.character, HashMap::from([("miku".to_string(), 0.9)]));
    }

    #[test]
    fn test_analyze_threshold_is_exclusive() {
        let catalog = TagCatalog::from_records([("safe", "9"), ("smile", "0"), ("miku", "4")]);
        let thresholds = Thresholds {
            general: 0.5,
            character: 0.9,
            ..Default::default()
        };
        let predictions = catalog.analyze(&[0.01, 0.5, 0.9], &thresholds);

        assert!(predictions.general.is_empty());
        assert!(predictions.character.is_empty());
        // rating is never filtered
        assert_eq!(predictions.rating.len(), 1);
    }

    #[test]
    fn test_analyze_mcut() {
        let catalog = catalog();
        let preds = [0.7, 0.2, 0.95, 0.9, 0.1, 0.12, 0.99];
        let thresholds = Thresholds {
            general_mcut: true,
            character_mcut: true,
            ..Default::default()
        };
        let predictions = catalog.analyze(&preds, &thresholds);

        // general: 0.95, 0.9 | 0.1 -> cutoff 0.5
        assert_eq!(predictions.general_names(), ["long hair", "^_^"]);
        // single character score 0.12 is its own cutoff, clamped to 0.15
        assert!(predictions.character.is_empty());
        // uncategorized tags are never reported
        assert!(!predictions.general.contains_key("artist name"));
        assert_eq!(predictions.rating(), Some(("general", 0.7)));
    }

    #[test]
    fn test_tags_order() {
        let catalog = catalog();
        let preds = [0.7, 0.2, 0.4, 0.9, 0.6, 0.95, 0.0];
        let predictions = catalog.analyze(&preds, &Thresholds::default());
        let names: Vec<_> = predictions.tags().into_iter().map(|(t, _)| t).collect();
        assert_eq!(names, ["^_^", "smile", "long hair", "hatsune miku"]);
    }
}
