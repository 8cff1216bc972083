//! Dictionary estimator used when no model credentials are configured.
//!
//! Deliberately small: it recognizes common foods with a leading quantity
//! ("2 eggs", "a banana", "half an avocado") and skips everything else.

use lazy_static::lazy_static;
use regex::Regex;

use super::FoodEstimate;
use crate::log::model::MAX_FOOD_CALORIES;

struct Entry {
    keys: &'static [&'static str],
    name: &'static str,
    calories: f64,
    protein: f64,
    serving: &'static str,
}

const fn entry(
    keys: &'static [&'static str],
    name: &'static str,
    calories: f64,
    protein: f64,
    serving: &'static str,
) -> Entry {
    Entry {
        keys,
        name,
        calories,
        protein,
        serving,
    }
}

// Per-serving values for common foods (USDA reference figures, rounded).
const FOODS: &[Entry] = &[
    entry(&["egg", "boiled egg", "fried egg"], "Egg", 78.0, 6.3, "1 large egg"),
    entry(&["banana"], "Banana", 105.0, 1.3, "1 medium"),
    entry(&["apple"], "Apple", 95.0, 0.5, "1 medium"),
    entry(&["orange juice"], "Orange juice", 112.0, 1.7, "1 cup"),
    entry(&["orange"], "Orange", 62.0, 1.2, "1 medium"),
    entry(&["avocado"], "Avocado", 240.0, 3.0, "1 medium"),
    entry(&["toast", "bread", "slice of bread"], "Bread", 80.0, 3.0, "1 slice"),
    entry(&["peanut butter"], "Peanut butter", 94.0, 4.0, "1 tbsp"),
    entry(&["oatmeal", "porridge", "oat"], "Oatmeal", 158.0, 6.0, "1 cup cooked"),
    entry(&["pancake"], "Pancake", 90.0, 2.5, "1 medium"),
    entry(&["bacon"], "Bacon", 43.0, 3.0, "1 slice"),
    entry(&["sausage"], "Sausage", 170.0, 7.0, "1 link"),
    entry(&["yogurt", "yoghurt"], "Yogurt", 100.0, 10.0, "1 cup"),
    entry(&["cheese"], "Cheese", 113.0, 7.0, "1 slice"),
    entry(&["milk"], "Milk", 103.0, 8.0, "1 cup"),
    entry(&["coffee"], "Coffee", 2.0, 0.3, "1 cup"),
    entry(&["rice"], "Rice", 206.0, 4.3, "1 cup cooked"),
    entry(&["pasta", "spaghetti"], "Pasta", 221.0, 8.1, "1 cup cooked"),
    entry(&["chicken breast", "chicken"], "Chicken breast", 165.0, 31.0, "100 g"),
    entry(&["salmon"], "Salmon", 208.0, 20.0, "100 g"),
    entry(&["steak", "beef"], "Beef steak", 271.0, 25.0, "100 g"),
    entry(&["tofu"], "Tofu", 144.0, 17.0, "150 g"),
    entry(&["potato"], "Potato", 161.0, 4.3, "1 medium"),
    entry(&["fries", "french fries"], "French fries", 365.0, 4.0, "1 medium serving"),
    entry(&["salad"], "Salad", 150.0, 3.0, "1 bowl"),
    entry(&["sandwich"], "Sandwich", 300.0, 15.0, "1 sandwich"),
    entry(&["burger", "hamburger", "cheeseburger"], "Burger", 354.0, 20.0, "1 burger"),
    entry(&["pizza", "slice of pizza"], "Pizza", 285.0, 12.0, "1 slice"),
    entry(&["cookie"], "Cookie", 78.0, 1.0, "1 cookie"),
    entry(&["donut", "doughnut"], "Donut", 195.0, 2.0, "1 donut"),
    entry(&["almond"], "Almonds", 7.0, 0.3, "1 almond"),
    entry(&["soda", "cola", "coke"], "Soda", 140.0, 0.0, "1 can"),
    entry(&["beer"], "Beer", 153.0, 1.6, "1 can"),
];

const NUMBER_WORDS: &[(&str, f64)] = &[
    ("a", 1.0),
    ("an", 1.0),
    ("one", 1.0),
    ("two", 2.0),
    ("three", 3.0),
    ("four", 4.0),
    ("five", 5.0),
    ("six", 6.0),
    ("seven", 7.0),
    ("eight", 8.0),
    ("nine", 9.0),
    ("ten", 10.0),
    ("eleven", 11.0),
    ("twelve", 12.0),
    ("half", 0.5),
    ("couple", 2.0),
];

lazy_static! {
    static ref SPLIT_RE: Regex = Regex::new(r"(?i)\s*(?:,|;|&|\+|\band\b|\bwith\b|\bplus\b)\s*").unwrap();
    static ref LEAD_RE: Regex = Regex::new(
        r"(?i)^(?:(?:for\s+\w+\s+)?i\s+(?:just\s+)?(?:had|ate|drank|have\s+had)|had|ate|some)\s+"
    )
    .unwrap();
    static ref QTY_RE: Regex = Regex::new(r"^(\d+(?:[.,]\d+)?)\s*(?:x\s+)?").unwrap();
    static ref FILLER_RE: Regex = Regex::new(
        r"\b(?:of|a|an|the|glass(?:es)?|cups?|bowls?|pieces?|slices?|servings?|plates?|large|medium|small|big)\b"
    )
    .unwrap();
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalEstimator;

impl LocalEstimator {
    pub fn estimate(&self, description: &str) -> Vec<FoodEstimate> {
        let lowered = description.to_lowercase();
        SPLIT_RE
            .split(&lowered)
            .filter_map(|fragment| estimate_fragment(fragment.trim()))
            .collect()
    }
}

fn estimate_fragment(fragment: &str) -> Option<FoodEstimate> {
    let fragment = fragment.trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
    let fragment = LEAD_RE.replace(fragment, "");
    let (quantity, rest) = split_quantity(&fragment);
    if quantity <= 0.0 {
        return None;
    }
    let entry = lookup(rest)?;

    let calories = (entry.calories * quantity).round();
    if calories > f64::from(MAX_FOOD_CALORIES) {
        return None;
    }
    let calories = calories as u32;
    let protein = (entry.protein * quantity * 10.0).round() / 10.0;
    let serving = if (quantity - 1.0).abs() < f64::EPSILON {
        entry.serving.to_string()
    } else {
        format!("{} x {}", format_quantity(quantity), entry.serving)
    };
    Some(FoodEstimate {
        name: entry.name.to_string(),
        calories,
        protein: Some(protein),
        serving: Some(serving),
    })
}

fn split_quantity(fragment: &str) -> (f64, &str) {
    if let Some(caps) = QTY_RE.captures(fragment) {
        let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let qty = caps
            .get(1)
            .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
            .unwrap_or(1.0);
        return (qty, fragment[whole..].trim_start());
    }
    let mut words = fragment.splitn(2, char::is_whitespace);
    let first = words.next().unwrap_or("");
    let rest = words.next().unwrap_or("").trim_start();
    match NUMBER_WORDS.iter().find(|(w, _)| *w == first) {
        // "half an avocado", "a couple of eggs"
        Some((_, qty)) => match rest.split_once(char::is_whitespace) {
            Some(("a" | "an", tail)) if *qty == 0.5 => (*qty, tail),
            Some(("couple", tail)) => (2.0, tail),
            _ => (*qty, rest),
        },
        None => (1.0, fragment),
    }
}

fn lookup(text: &str) -> Option<&'static Entry> {
    let stripped = FILLER_RE.replace_all(text, " ");
    let words: Vec<&str> = stripped.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    let raw = format!(" {} ", words.join(" "));
    let singular = format!(
        " {} ",
        words.iter().map(|w| singularize(w)).collect::<Vec<_>>().join(" ")
    );

    // Longest key wins so "orange juice" beats "orange".
    FOODS
        .iter()
        .flat_map(|e| e.keys.iter().map(move |k| (e, *k)))
        .filter(|(_, key)| {
            let needle = format!(" {key} ");
            raw.contains(&needle) || singular.contains(&needle)
        })
        .max_by_key(|(_, key)| key.len())
        .map(|(e, _)| e)
}

fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["ches", "shes", "oes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.ends_with('s') && stem.len() > 1 => stem.to_string(),
        _ => word.to_string(),
    }
}

fn format_quantity(q: f64) -> String {
    if q.fract().abs() < f64::EPSILON {
        format!("{}", q as i64)
    } else {
        format!("{q}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eggs_and_banana() {
        let items = LocalEstimator.estimate("2 eggs and 1 banana");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Egg");
        assert_eq!(items[0].calories, 156);
        assert_eq!(items[0].serving.as_deref(), Some("2 x 1 large egg"));
        assert_eq!(items[1].name, "Banana");
        assert_eq!(items[1].calories, 105);
        assert!(items.iter().all(|i| i.calories > 0));
    }

    #[test]
    fn number_words_and_lead_phrases() {
        let items = LocalEstimator.estimate("I had three pancakes, a coffee with milk");
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Pancake", "Coffee", "Milk"]);
        assert_eq!(items[0].calories, 270);
    }

    #[test]
    fn half_and_longest_key() {
        let items = LocalEstimator.estimate("half an avocado & a glass of orange juice");
        assert_eq!(items[0].name, "Avocado");
        assert_eq!(items[0].calories, 120);
        assert_eq!(items[1].name, "Orange juice");
    }

    #[test]
    fn plural_forms() {
        let items = LocalEstimator.estimate("2 sandwiches, 3 potatoes, 2 slices of pizza");
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Sandwich", "Potato", "Pizza"]);
        assert_eq!(items[2].calories, 570);
    }

    #[test]
    fn unknown_foods_are_skipped() {
        assert!(LocalEstimator.estimate("a bowl of mystery stew").is_empty());
        assert!(LocalEstimator.estimate("").is_empty());
        let items = LocalEstimator.estimate("durian and an apple");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Apple");
    }

    #[test]
    fn absurd_quantities_are_skipped() {
        assert!(LocalEstimator.estimate("99999999999 eggs and 99999999999 bananas").is_empty());
        let items = LocalEstimator.estimate("99999999999 eggs and 2 bananas");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].calories, 210);
    }
}
