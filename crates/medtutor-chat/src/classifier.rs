//! Intent classifier.
//!
//! Maps raw user text to a [`Category`] with ordered, case-insensitive
//! pattern rules. Categories are tried in priority order and the first
//! category with any matching rule wins; the default category never takes
//! part in matching.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::Category;

// =============================================================================
// Rule table
// =============================================================================

/// Rule sources per category, in priority order.
pub(crate) const RULE_SOURCES: &[(Category, &[&str])] = &[
    (
        Category::CurriculumTooling,
        &[
            r"plano.*aula",
            r"rubrica",
            r"ementa",
            r"avalia[çc][aã]o.*pr[aá]tica",
            r"osce",
            r"plano.*ensino",
            r"pbl",
            r"tbl",
            r"mapa.*mental",
            r"bibliografia",
            r"estudo.*dirigido",
            r"caso.*prova",
            r"metodologia.*ativa",
            r"diretriz",
            r"resumo.*artigo",
            r"gabarito",
            r"compet[êe]ncia",
            r"objetivo.*aprendizagem",
        ],
    ),
    (
        Category::AssessmentGenerator,
        &[
            r"crie.*prova",
            r"quest[oõ]es.*enade",
            r"simulado.*revalida",
            r"exerc[ií]cios.*prova",
            r"teste.*cbm",
            r"enamed",
            r"exame.*resid[êe]ncia",
            r"banco.*quest[oõ]es",
        ],
    ),
    (
        Category::ExamGenerator,
        &[
            r"quiz",
            r"quest[oõ]es",
            r"perguntas.*m[uú]ltipla",
            r"teste.*sobre",
            r"gere.*quest",
            r"fa[çc]a.*quiz",
        ],
    ),
    (
        Category::StudyCardGenerator,
        &[
            r"flash.?card",
            r"cart[oõ]es.*revis[aã]o",
            r"cart[oõ]es.*estudo",
        ],
    ),
    (
        Category::ScenarioSimulator,
        &[
            r"caso.?cl[ií]nico",
            r"estudo.*caso",
            r"case.*study",
            r"crie.*caso",
            r"gere.*caso",
            r"simul.*paciente",
        ],
    ),
    (
        Category::ImageAnalysis,
        &[
            r"an[aá]lis.*imagem",
            r"raio.?x",
            r"radiolog",
            r"descrev.*imagem",
            r"laudo",
            r"xray",
            r"tomografia",
            r"resson[aâ]ncia",
            r"histopatolog",
            r"dermatolog",
            r"oftalmolog",
            r"fundoscop",
            r"\bct\b",
            r"\bmri\b",
        ],
    ),
];

struct CompiledRule {
    category: Category,
    source: &'static str,
    regex: Regex,
}

static RULES: LazyLock<Vec<CompiledRule>> = LazyLock::new(|| {
    RULE_SOURCES
        .iter()
        .flat_map(|(category, sources)| {
            sources.iter().map(move |source| CompiledRule {
                category: *category,
                source,
                regex: Regex::new(&format!("(?i){}", source)).expect("Invalid category regex"),
            })
        })
        .collect()
});

// =============================================================================
// Classifier
// =============================================================================

/// Stateless classifier over the process-wide rule table.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify `text` into a category. Never fails.
    pub fn classify(&self, text: &str) -> Category {
        self.matched_rule(text)
            .map(|(category, _)| category)
            .unwrap_or(Category::DEFAULT)
    }

    /// The winning category together with the rule that matched, or `None`
    /// when the input falls through to the default.
    pub fn matched_rule(&self, text: &str) -> Option<(Category, &'static str)> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        RULES
            .iter()
            .find(|rule| rule.regex.is_match(text))
            .map(|rule| (rule.category, rule.source))
    }
}

/// Classify `text` with the default rule table.
pub fn classify(text: &str) -> Category {
    IntentClassifier.classify(text)
}

/// Rule sources registered for `category`. Empty for the default.
pub fn rules_for(category: Category) -> &'static [&'static str] {
    RULE_SOURCES
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, rules)| *rules)
        .unwrap_or(&[])
}
