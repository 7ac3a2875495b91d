//! Keyword taxonomies for contraceptive methods and side effects.
//!
//! Each entry maps a canonical key to a case-insensitive pattern covering the
//! exact term plus common misspellings and slang, matched on word boundaries.
//! Short generic terms ("the shot", "the ring", "pop") intentionally
//! over-match when used in unrelated senses; that is a documented limitation
//! of keyword tagging, not a bug.

use regex::{Regex, RegexBuilder};
use serde::Serialize;

/// Bump when a pattern table changes so the backfill pass can spot rows
/// enriched against an older taxonomy.
pub const LEXICON_VERSION: i64 = 1;

/// One canonical key and the pattern variants that map to it.
struct LexiconEntry {
    key: &'static str,
    pattern: Regex,
    /// Negative guard: suppress the match when this also matches the text.
    /// Expresses rules like "generic IUD, unless a brand is named" — the
    /// regex crate has no lookahead, so the guard lives at the entry level.
    unless: Option<Regex>,
}

/// An immutable, versioned keyword taxonomy. Construct once, share freely.
pub struct Lexicon {
    version: i64,
    entries: Vec<LexiconEntry>,
}

/// One pattern occurrence with its byte span, for annotated output.
#[derive(Debug, Clone, Serialize)]
pub struct LexiconMatch {
    pub key: &'static str,
    pub matched: String,
    pub start: usize,
    pub end: usize,
}

type PatternRow = (&'static str, &'static str, Option<&'static str>);

impl Lexicon {
    /// The contraceptive-method taxonomy.
    pub fn contraceptives() -> Self {
        Self::build(LEXICON_VERSION, CONTRACEPTIVES)
    }

    /// The side-effect taxonomy.
    pub fn side_effects() -> Self {
        Self::build(LEXICON_VERSION, SIDE_EFFECTS)
    }

    fn build(version: i64, table: &[PatternRow]) -> Self {
        let entries = table
            .iter()
            .map(|(key, pattern, unless)| LexiconEntry {
                key,
                pattern: compile(pattern),
                unless: unless.map(compile),
            })
            .collect();
        Self { version, entries }
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Canonical keys whose patterns match anywhere in `text`, in table
    /// order. One hit per key no matter how many occurrences.
    pub fn matches(&self, text: &str) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|e| {
                e.pattern.is_match(text)
                    && !e.unless.as_ref().is_some_and(|u| u.is_match(text))
            })
            .map(|e| e.key)
            .collect()
    }

    /// Every pattern occurrence with its span, sorted by position. The
    /// ingestion path only needs `matches`; this is the annotated variant
    /// the validation endpoint serves.
    pub fn explain(&self, text: &str) -> Vec<LexiconMatch> {
        let mut out = Vec::new();
        for entry in &self.entries {
            if entry.unless.as_ref().is_some_and(|u| u.is_match(text)) {
                continue;
            }
            for m in entry.pattern.find_iter(text) {
                out.push(LexiconMatch {
                    key: entry.key,
                    matched: m.as_str().to_string(),
                    start: m.start(),
                    end: m.end(),
                });
            }
        }
        out.sort_by_key(|m| (m.start, m.end));
        out
    }
}

fn compile(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("invalid lexicon pattern {pattern:?}: {e}"))
}

const CONTRACEPTIVES: &[PatternRow] = &[
    ("Mirena", r"\bmir[ei]na\b|\bmer[ei]na\b", None),
    ("Kyleena", r"\bkyleena\b|\bkylena\b", None),
    ("Liletta", r"\bliletta\b|\blilletta\b", None),
    ("Skyla", r"\bskyla\b|\bskila\b", None),
    (
        "Paragard",
        r"\bparagard\b|\bparaguard\b|\bpara\s*guard\b|\bcopper\s*iud\b|\bcopper\s*t\b",
        None,
    ),
    (
        "IUD (general)",
        r"\biud\b|\bhormonal\s+iud\b",
        Some(r"\bmirena\b|\bkyleena\b|\bparagard\b|\bliletta\b|\bskyla\b"),
    ),
    (
        "Nexplanon",
        r"\bnexplanon\b|\bnexplanion\b|\bimplanon\b|\bthe\s+implant\b|\barm\s+implant\b|\bimplant\s+in\s+(?:my\s+)?arm\b",
        None,
    ),
    ("Combined pill", r"\bcombined\s+pill\b|\bcombination\s+pill\b|\bcoc\b", None),
    (
        "Mini pill",
        r"\bmini[\s-]*pill\b|\bpop\b(?:\s+pill)?|\bprogestin[\s-]+only\s+pill\b",
        None,
    ),
    (
        "The pill (general)",
        r"\b(?:the|birth\s*control|bc)\s+pill[s]?\b|\boral\s+contracepti\w+\b|\bbc\s+pills?\b",
        None,
    ),
    (
        "Depo-Provera",
        r"\bdepo\b|\bthe\s+shot\b|\bdepo[\s-]*provera\b|\bbirth\s*control\s+shot\b|\bbc\s+shot\b",
        None,
    ),
    ("NuvaRing", r"\bnuvaring\b|\bnuva\s+ring\b|\bthe\s+ring\b|\bannovera\b", None),
    (
        "Xulane patch",
        r"\bxulane\b|\bthe\s+patch\b|\bortho\s*evra\b|\btwirla\b|\bbc\s+patch\b|\bbirth\s*control\s+patch\b",
        None,
    ),
    (
        "Plan B",
        r"\bplan\s*b\b|\bmorning[\s-]+after\b|\bemergency\s+contracep\w+\b|\bella\b|\bec\s+pill\b",
        None,
    ),
    ("Condoms", r"\bcondom[s]?\b", None),
    ("Spermicide", r"\bspermicid\w+\b", None),
    ("Diaphragm", r"\bdiaphragm\b|\bcaya\b", None),
    (
        "FAM/NFP",
        r"\bfam\b|\bnfp\b|\bfertility\s+awareness\b|\bnatural\s+family\s+planning\b|\btemping\b|\bbbt\b|\bbasal\s+body\s+temp\b",
        None,
    ),
    (
        "Withdrawal",
        r"\bwithdrawal\b|\bpull\s*(?:ing\s+)?out\b|\bpull\s+out\s+method\b",
        None,
    ),
    ("Slynd", r"\bslynd\b", None),
    ("Yaz", r"\byaz\b|\byasmin\b|\byasmine\b", None),
    ("Lo Loestrin", r"\blo\s*loestrin\b|\blo\s*lo\b", None),
    ("Phexxi", r"\bphexxi\b", None),
    (
        "Ortho Tri-Cyclen",
        r"\bortho[\s-]*tri[\s-]*cyclen\b|\btri[\s-]*sprintec\b|\btri[\s-]*lo[\s-]*sprintec\b",
        None,
    ),
    (
        "Junel",
        r"\bjunel\b|\bjunel\s+fe\b|\bloestrin\b|\bmicrogestin\b",
        Some(r"\blo\s*loestrin\b"),
    ),
    (
        "Seasonique",
        r"\bseasonique\b|\bseasonale\b|\bjolessa\b|\bcamrese\b",
        None,
    ),
    (
        "Sprintec",
        r"\bsprintec\b|\bmono[\s-]*linyah\b",
        Some(r"\btri[\s-]*sprintec\b"),
    ),
];

const SIDE_EFFECTS: &[PatternRow] = &[
    (
        "Bleeding/spotting",
        r"\bbleed(?:ing)?\b|\bspotting\b|\bheavy\s+period\b|\birregular\s+bleed",
        None,
    ),
    ("Cramping", r"\bcramp(?:s|ing)?\b", None),
    (
        "Weight gain",
        r"\bweight\s+gain\b|\bgained\s+weight\b|\bgaining\s+weight\b",
        None,
    ),
    ("Weight loss", r"\bweight\s+loss\b|\blos(?:t|ing)\s+weight\b", None),
    ("Acne", r"\bacne\b|\bbreakout[s]?\b|\bpimple[s]?\b|\bzit[s]?\b", None),
    (
        "Hair loss",
        r"\bhair\s+(?:loss|thin(?:ning)?|fall(?:ing)?)\b|\bshedding\s+hair\b|\blosing\s+hair\b",
        None,
    ),
    (
        "Mood swings",
        r"\bmood\s+swing[s]?\b|\bmood\s+change[s]?\b|\bemotional\b|\birritable\b|\birritab(?:le|ility)\b",
        None,
    ),
    (
        "Depression",
        r"\bdepress(?:ed|ion|ing)?\b|\bmental\s+health\b|\bsuicidal\b",
        None,
    ),
    (
        "Anxiety",
        r"\banxi(?:ety|ous)\b|\bpanic\s+attack[s]?\b|\bnervous(?:ness)?\b",
        None,
    ),
    ("Headaches", r"\bheadache[s]?\b|\bmigraine[s]?\b", None),
    (
        "Nausea",
        r"\bnause(?:a|ous|ated)\b|\bvomit(?:ing)?\b|\bthrew\s+up\b|\bthrow(?:ing)?\s+up\b",
        None,
    ),
    (
        "Fatigue",
        r"\bfatigue[d]?\b|\bexhaust(?:ed|ion)\b|\btired(?:ness)?\b|\blethargi?c\b|\bno\s+energy\b",
        None,
    ),
    (
        "Low libido",
        r"\blow\s+libido\b|\bno\s+(?:sex\s+)?drive\b|\blibido\b|\bsex\s+drive\b",
        None,
    ),
    (
        "Breast tenderness",
        r"\bbreast\s+(?:tender(?:ness)?|sore(?:ness)?|pain)\b|\bsore\s+breast[s]?\b|\bsore\s+boob[s]?\b",
        None,
    ),
    ("Bloating", r"\bbloat(?:ed|ing)?\b", None),
    ("Back pain", r"\bback\s+pain\b|\blower\s+back\b", None),
    (
        "Insertion pain",
        r"\binsertion\s+(?:pain|hurt|awful|terrible)\b|\bpain(?:ful)?\s+insertion\b",
        None,
    ),
    (
        "Removal pain",
        r"\bremoval\s+(?:pain|hurt)\b|\bpain(?:ful)?\s+removal\b",
        None,
    ),
    (
        "Infection",
        r"\binfection[s]?\b|\bbv\b|\byeast\s+infection\b|\bbacterial\s+vaginosis\b|\buti\b",
        None,
    ),
    (
        "Strings",
        r"\bstring[s]?\b|\bcan'?t\s+feel\b|\bpartner\s+(?:feel|felt)\b",
        None,
    ),
    (
        "Expulsion",
        r"\bexpuls(?:ion|ed)\b|\bfell\s+out\b|\bcame\s+out\b|\bdisplaced\b|\bmoved\b",
        None,
    ),
    (
        "Blood clots",
        r"\bblood\s+clot[s]?\b|\bdvt\b|\bthrombos[ie]s\b|\bpulmonary\s+embolism\b|\bpe\b",
        None,
    ),
    (
        "Brain fog",
        r"\bbrain\s+fog\b|\bfog(?:gy|giness)\b|\bcan'?t\s+(?:think|concentrate|focus)\b",
        None,
    ),
    (
        "Dizziness",
        r"\bdizz(?:y|iness)\b|\blightheaded\b|\bfaint(?:ing|ed)?\b",
        None,
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_are_deterministic() {
        let lex = Lexicon::contraceptives();
        let text = "Got my Mirena inserted last week, the IUD was fine";
        assert_eq!(lex.matches(text), lex.matches(text));
    }

    #[test]
    fn misspelling_variants_map_to_same_key() {
        let lex = Lexicon::contraceptives();
        assert_eq!(lex.matches("I love my mirena"), vec!["Mirena"]);
        assert_eq!(lex.matches("I love my merina"), vec!["Mirena"]);
    }

    #[test]
    fn one_hit_per_key_despite_repeats() {
        let lex = Lexicon::contraceptives();
        let hits = lex.matches("mirena mirena MIRENA");
        assert_eq!(hits, vec!["Mirena"]);
    }

    #[test]
    fn word_boundaries_prevent_substring_hits() {
        let lex = Lexicon::contraceptives();
        // "admirena" should not hit Mirena; "yazoo" should not hit Yaz.
        assert!(lex.matches("the admirenal gland, the yazoo river").is_empty());
    }

    #[test]
    fn generic_iud_suppressed_when_brand_named() {
        let lex = Lexicon::contraceptives();
        let hits = lex.matches("my IUD is a mirena");
        assert!(hits.contains(&"Mirena"));
        assert!(!hits.contains(&"IUD (general)"));

        let hits = lex.matches("thinking about getting an IUD");
        assert_eq!(hits, vec!["IUD (general)"]);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let lex = Lexicon::side_effects();
        assert_eq!(lex.matches("TERRIBLE MOOD SWINGS"), vec!["Mood swings"]);
    }

    #[test]
    fn side_effect_taxonomy_covers_example() {
        let lex = Lexicon::side_effects();
        let hits = lex.matches("Switched to Mirena, mood swings were awful");
        assert_eq!(hits, vec!["Mood swings"]);
    }

    #[test]
    fn explain_reports_spans_in_text_order() {
        let lex = Lexicon::contraceptives();
        let text = "got a mirena after trying yaz";
        let matches = lex.explain(text);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].key, "Mirena");
        assert_eq!(&text[matches[0].start..matches[0].end], "mirena");
        assert_eq!(matches[1].key, "Yaz");
        assert_eq!(matches[1].matched, "yaz");
    }

    #[test]
    fn explain_honors_the_unless_guard() {
        let lex = Lexicon::contraceptives();
        let matches = lex.explain("my IUD is a mirena");
        assert!(matches.iter().any(|m| m.key == "Mirena"));
        assert!(matches.iter().all(|m| m.key != "IUD (general)"));
    }

    #[test]
    fn taxonomies_compile_and_are_nonempty() {
        assert_eq!(Lexicon::contraceptives().matches("").len(), 0);
        assert!(Lexicon::contraceptives().version() >= 1);
        assert!(Lexicon::side_effects().version() >= 1);
    }
}
