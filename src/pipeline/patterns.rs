//! Policy tables shared by the classifier, the retrieval coordinator and the
//! safety validator.
//!
//! `PatternConfig` is plain data (JSON on disk, `Default` in code). It is
//! compiled once into a `PatternTable`, which is immutable and shared by
//! every request through `Arc`. `PatternStore` swaps whole tables on reload;
//! a request keeps the snapshot it started with.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use regex::{Regex, RegexBuilder, RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::rag::types::QueryType;

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Invalid regex in {set}: {source}")]
    InvalidRegex {
        set: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("No route configured for query type {0}")]
    MissingRoute(QueryType),

    #[error("Query type {0} cannot be assigned by {1}")]
    ReservedQueryType(QueryType, &'static str),

    #[error("Pattern file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pattern file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No pattern file configured")]
    NoSource,
}

// ═══════════════════════════════════════════════════════════
// Configuration data
// ═══════════════════════════════════════════════════════════

/// One step of the classification cascade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryRule {
    pub query_type: QueryType,
    pub patterns: Vec<String>,
    pub confidence: f32,
}

/// Upstream NLU intent code mapped to a query type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentMapping {
    pub intent: String,
    pub query_type: QueryType,
}

/// Retrieval parameters for a query type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteRule {
    pub query_type: QueryType,
    pub strategy: String,
    pub recommended_k: usize,
    #[serde(default)]
    pub category_filter: Option<String>,
}

/// Relevance multiplier for documents of `category` under `query_type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoostRule {
    pub query_type: QueryType,
    pub category: String,
    pub factor: f32,
}

/// Hedging rewrite applied to warning-level text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RephraseRuleConfig {
    pub pattern: String,
    /// Replacement template ($1, $2 for capture groups).
    pub replacement: String,
}

/// Disclaimer text per disclaimer family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisclaimerTemplates {
    pub general: String,
    pub medication: String,
    pub symptom: String,
    pub emergency: String,
    pub chronic: String,
    pub mental_health: String,
}

/// Everything the safety validator reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidatorConfig {
    pub critical: Vec<String>,
    /// Cautionary phrasing removed from the text before the critical scan,
    /// so "do not stop taking your medication" is not read as an instruction.
    #[serde(default)]
    pub critical_exempt: Vec<String>,
    pub emergency_indicators: Vec<String>,
    pub warning: Vec<String>,
    pub rephrase: Vec<RephraseRuleConfig>,
    pub disclaimer_keywords: Vec<String>,
    pub disclaimer_min_keywords: usize,
    pub disclaimers: DisclaimerTemplates,
    pub credible_sources: Vec<String>,
    pub verification_min_confidence: f32,
    pub verification_ratio: f32,
}

/// Full policy configuration, as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternConfig {
    pub version: String,
    pub emergency: Vec<String>,
    pub emergency_confidence: f32,
    /// Evaluated in order; first match wins.
    pub categories: Vec<CategoryRule>,
    pub intents: Vec<IntentMapping>,
    pub intent_confidence: f32,
    pub default_confidence: f32,
    pub routes: Vec<RouteRule>,
    pub boosts: Vec<BoostRule>,
    pub validator: ValidatorConfig,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn route(query_type: QueryType, strategy: &str, k: usize, filter: Option<&str>) -> RouteRule {
    RouteRule {
        query_type,
        strategy: strategy.to_string(),
        recommended_k: k,
        category_filter: filter.map(str::to_string),
    }
}

fn boost(query_type: QueryType, category: &str, factor: f32) -> BoostRule {
    BoostRule {
        query_type,
        category: category.to_string(),
        factor,
    }
}

fn rephrase(pattern: &str, replacement: &str) -> RephraseRuleConfig {
    RephraseRuleConfig {
        pattern: pattern.to_string(),
        replacement: replacement.to_string(),
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            version: "builtin-1".into(),
            emergency: strings(&[
                r"\b(chest pain|heart attack|stroke|seizure|overdose)\b",
                r"\b(suicide|suicidal|kill myself)\b",
                r"\b(emergency|911|urgent|immediate)\b",
                r"\b(unconscious|bleeding heavily|choking)\b",
                r"\b(severe allergic reaction|anaphylaxis)\b",
                r"\b(can['’]t breathe|cannot breathe|difficulty breathing)\b",
            ]),
            emergency_confidence: 0.95,
            categories: vec![
                CategoryRule {
                    query_type: QueryType::DrugInteraction,
                    patterns: strings(&[
                        r"\b(interaction|interact|combine|mix|together)\b.*\b(medications?|drugs?|pills?)\b",
                        r"\bcan i take\b.*\bwith\b",
                        r"\b(safe to|danger|risk).*\b(combine|mix)\b",
                        r"\bmedicine.*\btogether\b",
                    ]),
                    confidence: 0.85,
                },
                CategoryRule {
                    query_type: QueryType::SymptomCheck,
                    patterns: strings(&[
                        r"\b(symptoms?|feel|pain|ache|hurt)\b",
                        r"\b(headache|fever|nausea|dizzy)\b",
                        r"\bhave\b.*\b(for|since)\b",
                        r"\bwhat could cause\b",
                        r"\bexperiencing\b",
                    ]),
                    confidence: 0.80,
                },
                CategoryRule {
                    query_type: QueryType::MedicationInfo,
                    patterns: strings(&[
                        r"\b(side effects?|dosage|how much)\b",
                        r"\bmedication\b.*\b(for|treat)\b",
                        r"\btake\b.*\b(daily|times)\b",
                        r"\bprescription\b",
                    ]),
                    confidence: 0.80,
                },
                CategoryRule {
                    query_type: QueryType::ChronicCare,
                    patterns: strings(&[
                        r"\b(diabetes|hypertension|asthma|arthritis)\b",
                        r"\b(manage|management|control)\b",
                        r"\b(diet|exercise|lifestyle)\b.*\b(chronic|condition)\b",
                        r"\bblood (pressure|sugar|glucose)\b",
                    ]),
                    confidence: 0.80,
                },
                CategoryRule {
                    query_type: QueryType::MentalHealth,
                    patterns: strings(&[
                        r"\b(anxiety|depression|stress|mental)\b",
                        r"\b(mood|feeling|emotional)\b",
                        r"\b(therapy|counseling|support)\b",
                        r"\b(sleep|insomnia|tired)\b",
                    ]),
                    confidence: 0.80,
                },
                CategoryRule {
                    query_type: QueryType::Diagnostic,
                    patterns: strings(&[
                        r"\b(test|lab|blood work|scan)\b",
                        r"\b(diagnosis|diagnose|what is)\b",
                        r"\b(results|levels|values)\b",
                        r"\b(normal range|abnormal)\b",
                    ]),
                    confidence: 0.75,
                },
            ],
            intents: vec![
                IntentMapping {
                    intent: "ask_medication".into(),
                    query_type: QueryType::MedicationInfo,
                },
                IntentMapping {
                    intent: "symptom_check".into(),
                    query_type: QueryType::SymptomCheck,
                },
                IntentMapping {
                    intent: "chronic_care".into(),
                    query_type: QueryType::ChronicCare,
                },
                IntentMapping {
                    intent: "mental_health".into(),
                    query_type: QueryType::MentalHealth,
                },
            ],
            intent_confidence: 0.9,
            default_confidence: 0.6,
            routes: vec![
                route(QueryType::DrugInteraction, "interaction_focused", 3, Some("interaction")),
                route(QueryType::SymptomCheck, "symptom_focused", 4, Some("symptom")),
                route(QueryType::MedicationInfo, "medication_focused", 3, Some("medication")),
                route(QueryType::ChronicCare, "chronic_focused", 4, Some("chronic_condition")),
                route(QueryType::MentalHealth, "mental_health_focused", 3, Some("mental_health")),
                route(QueryType::Diagnostic, "diagnostic_focused", 4, None),
                route(QueryType::GeneralHealth, "hybrid_search", 5, None),
            ],
            boosts: vec![
                boost(QueryType::DrugInteraction, "interaction", 1.2),
                boost(QueryType::DrugInteraction, "medication", 1.1),
                boost(QueryType::SymptomCheck, "symptom", 1.2),
                boost(QueryType::SymptomCheck, "chronic_condition", 1.1),
                boost(QueryType::MedicationInfo, "medication", 1.2),
                boost(QueryType::MedicationInfo, "interaction", 1.1),
                boost(QueryType::ChronicCare, "chronic_condition", 1.2),
                boost(QueryType::ChronicCare, "symptom", 1.1),
                boost(QueryType::MentalHealth, "mental_health", 1.2),
            ],
            validator: ValidatorConfig::default(),
        }
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            critical: strings(&[
                // Stopping or altering medication without guidance
                r"\b(stop|quit|discontinue)\s+(taking\s+)?((your|my|the|all|any)\s+)?(medications?|medicines?|pills?|meds|prescriptions?)\b",
                r"\b(take more|increase (your )?(dose|dosage)|double (your |the )?(dose|dosage)|skip (your )?doses?)\b",
                // Diagnosis asserted as fact
                r"\byou\s+(definitely|certainly|clearly|obviously)\s+have\b",
                r"\byou\s+(have\s+been|are)\s+diagnosed\s+with\b",
                r"\bthis\s+(confirms|proves)\s+(that\s+)?you\s+have\b",
                // Promised cure
                r"\b(will cure|cures it|guaranteed to (work|cure)|will fix|miracle cure|100% effective)\b",
                // Discouraging medical consultation
                r"\b(never see a doctor|don['’]t need (a doctor|medical care|to see a doctor)|no need to see a doctor)\b",
                r"\b(instead of seeing (a |your )?doctor|replace medical treatment)\b",
            ]),
            critical_exempt: strings(&[
                r"\b(do not|don['’]t|never|avoid|should not|shouldn['’]t|must not|not to)\s+(\w+ly\s+)?(stop|quit|discontinue|skip|take more|double|increase)\b",
                r"\b(before|without first|until)\s+(you\s+)?(\w+ly\s+)?(stop|quit|discontinue|skip|take more|double|increase)\b",
            ]),
            emergency_indicators: strings(&[
                r"\b(call 911|call emergency services|emergency room|immediate medical attention)\b",
                r"\b(life-threatening|critical condition|urgent care)\b",
                r"\b(heart attack|stroke|severe allergic reaction|anaphylaxis)\b",
            ]),
            warning: strings(&[
                r"\b(should take|recommended dose|try taking)\b",
                r"\b(probably|likely|might be|could be)\s+\w+\s+(disease|condition|syndrome)\b",
                r"\b(home remed(y|ies)|natural cure|alternative to medicine)\b",
                r"\b(self-treat|treat yourself|manage on your own)\b",
            ]),
            rephrase: vec![
                rephrase(
                    r"\b(?:you\s+)?should\s+take\b",
                    "you might consider discussing with your doctor whether to take",
                ),
                rephrase(
                    r"\btry\s+taking\b",
                    "you might consider discussing with your doctor whether to take",
                ),
                rephrase(
                    r"\brecommended\s+dose\b",
                    "dose (you might consider discussing with your doctor what is right for you)",
                ),
                rephrase(
                    r"\b(?:is|are)\s+(?:probably|likely)\s+(\w+\s+(?:disease|condition|syndrome))\b",
                    "may be $1 (symptoms may suggest this - consult a doctor for diagnosis)",
                ),
                rephrase(
                    r"\b(?:probably|likely|might\s+be|could\s+be)\s+(\w+\s+(?:disease|condition|syndrome))\b",
                    "might be $1 (symptoms may suggest this - consult a doctor for diagnosis)",
                ),
                rephrase(
                    r"\b(home\s+remed(?:y|ies)|natural\s+cure|alternative\s+to\s+medicine)\b",
                    "$1 (you might consider discussing with your doctor first)",
                ),
                rephrase(
                    r"\b(?:self-treat|treat\s+yourself|manage\s+on\s+your\s+own)\b",
                    "manage this together with your doctor",
                ),
            ],
            disclaimer_keywords: strings(&["consult", "healthcare", "professional", "doctor", "physician"]),
            disclaimer_min_keywords: 2,
            disclaimers: DisclaimerTemplates {
                general: "This information is for educational purposes only and should not replace professional medical advice. Please consult a healthcare provider for personalized guidance.".into(),
                medication: "Medication information is general. Follow your doctor's instructions and consult a pharmacist or physician before changes.".into(),
                symptom: "Symptom information is for awareness only. Consult a qualified healthcare professional for diagnosis and treatment.".into(),
                emergency: "If experiencing a medical emergency, call emergency services immediately (911/999/112) or go to the nearest emergency room.".into(),
                chronic: "Chronic condition management requires medical supervision. This supplements, but does not replace, your healthcare team's guidance.".into(),
                mental_health: "Mental health support is general guidance. Consult a licensed therapist or counselor. In crisis, contact emergency services or a helpline.".into(),
            },
            credible_sources: strings(&[
                "internal_kb",
                "cdc",
                "who",
                "drugbank",
                "medlineplus",
                "emergency protocol",
            ]),
            verification_min_confidence: 0.7,
            verification_ratio: 0.5,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Compiled table
// ═══════════════════════════════════════════════════════════

/// A cascade step with its compiled matcher.
#[derive(Debug)]
pub struct CompiledCategory {
    pub query_type: QueryType,
    pub matcher: RegexSet,
    pub confidence: f32,
}

/// A compiled hedging rewrite.
#[derive(Debug)]
pub struct RephraseRule {
    pub pattern: Regex,
    pub replacement: String,
}

/// Immutable, compiled policy. Shared read-only across requests.
#[derive(Debug)]
pub struct PatternTable {
    pub version: String,
    pub emergency: RegexSet,
    pub emergency_confidence: f32,
    pub categories: Vec<CompiledCategory>,
    pub intent_confidence: f32,
    pub default_confidence: f32,
    pub critical: RegexSet,
    pub critical_exempt: Vec<Regex>,
    pub emergency_indicators: RegexSet,
    pub warning: RegexSet,
    pub rephrase: Vec<RephraseRule>,
    /// Lowercased.
    pub disclaimer_keywords: Vec<String>,
    pub disclaimer_min_keywords: usize,
    pub disclaimers: DisclaimerTemplates,
    /// Lowercased.
    pub credible_sources: Vec<String>,
    pub verification_min_confidence: f32,
    pub verification_ratio: f32,
    intents: HashMap<String, QueryType>,
    routes: HashMap<QueryType, RouteRule>,
    boosts: HashMap<QueryType, Vec<(String, f32)>>,
}

impl PatternTable {
    /// Validate and compile a configuration.
    pub fn compile(config: &PatternConfig) -> Result<Self, PatternError> {
        unit_interval("emergency_confidence", config.emergency_confidence)?;
        unit_interval("intent_confidence", config.intent_confidence)?;
        unit_interval("default_confidence", config.default_confidence)?;

        let emergency = regex_set("emergency", &config.emergency)?;

        let mut categories = Vec::with_capacity(config.categories.len());
        for rule in &config.categories {
            if rule.query_type == QueryType::Emergency {
                return Err(PatternError::ReservedQueryType(rule.query_type, "category rules"));
            }
            unit_interval(&format!("categories.{}.confidence", rule.query_type), rule.confidence)?;
            categories.push(CompiledCategory {
                query_type: rule.query_type,
                matcher: regex_set(&format!("categories.{}", rule.query_type), &rule.patterns)?,
                confidence: rule.confidence,
            });
        }

        let mut intents = HashMap::new();
        for mapping in &config.intents {
            if mapping.query_type == QueryType::Emergency {
                return Err(PatternError::ReservedQueryType(mapping.query_type, "intent mapping"));
            }
            intents.insert(mapping.intent.clone(), mapping.query_type);
        }

        let mut routes = HashMap::new();
        for rule in &config.routes {
            if rule.recommended_k == 0 {
                return Err(PatternError::InvalidValue {
                    field: format!("routes.{}.recommended_k", rule.query_type),
                    value: "0".into(),
                });
            }
            routes.insert(rule.query_type, rule.clone());
        }
        // Every type the cascade can produce needs retrieval parameters.
        let reachable = categories
            .iter()
            .map(|c| c.query_type)
            .chain(intents.values().copied())
            .chain(std::iter::once(QueryType::GeneralHealth));
        for query_type in reachable {
            if !routes.contains_key(&query_type) {
                return Err(PatternError::MissingRoute(query_type));
            }
        }

        let mut boosts: HashMap<QueryType, Vec<(String, f32)>> = HashMap::new();
        for rule in &config.boosts {
            if !rule.factor.is_finite() || rule.factor < 1.0 {
                return Err(PatternError::InvalidValue {
                    field: format!("boosts.{}.{}", rule.query_type, rule.category),
                    value: rule.factor.to_string(),
                });
            }
            boosts
                .entry(rule.query_type)
                .or_default()
                .push((rule.category.clone(), rule.factor));
        }

        let validator = &config.validator;
        unit_interval(
            "validator.verification_min_confidence",
            validator.verification_min_confidence,
        )?;
        unit_interval("validator.verification_ratio", validator.verification_ratio)?;
        if validator.disclaimer_min_keywords == 0 {
            return Err(PatternError::InvalidValue {
                field: "validator.disclaimer_min_keywords".into(),
                value: "0".into(),
            });
        }

        let rephrase = validator
            .rephrase
            .iter()
            .map(|rule| {
                Ok(RephraseRule {
                    pattern: regex("validator.rephrase", &rule.pattern)?,
                    replacement: rule.replacement.clone(),
                })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;
        let critical_exempt = validator
            .critical_exempt
            .iter()
            .map(|pattern| regex("validator.critical_exempt", pattern))
            .collect::<Result<Vec<_>, PatternError>>()?;

        Ok(Self {
            version: config.version.clone(),
            emergency,
            emergency_confidence: config.emergency_confidence,
            categories,
            intent_confidence: config.intent_confidence,
            default_confidence: config.default_confidence,
            critical: regex_set("validator.critical", &validator.critical)?,
            critical_exempt,
            emergency_indicators: regex_set(
                "validator.emergency_indicators",
                &validator.emergency_indicators,
            )?,
            warning: regex_set("validator.warning", &validator.warning)?,
            rephrase,
            disclaimer_keywords: lowercase_all(&validator.disclaimer_keywords),
            disclaimer_min_keywords: validator.disclaimer_min_keywords,
            disclaimers: validator.disclaimers.clone(),
            credible_sources: lowercase_all(&validator.credible_sources),
            verification_min_confidence: validator.verification_min_confidence,
            verification_ratio: validator.verification_ratio,
            intents,
            routes,
            boosts,
        })
    }

    /// The built-in policy.
    pub fn builtin() -> Self {
        Self::compile(&PatternConfig::default()).expect("built-in pattern table compiles")
    }

    /// Load and compile a JSON pattern file.
    pub fn load(path: &Path) -> Result<Self, PatternError> {
        let raw = std::fs::read_to_string(path)?;
        let config: PatternConfig = serde_json::from_str(&raw)?;
        Self::compile(&config)
    }

    pub fn intent_type(&self, intent: &str) -> Option<QueryType> {
        self.intents.get(intent).copied()
    }

    pub fn route(&self, query_type: QueryType) -> Option<&RouteRule> {
        self.routes.get(&query_type)
    }

    /// Boost factor for a document category under a query type.
    pub fn boost_for(&self, query_type: QueryType, category: &str) -> Option<f32> {
        self.boosts
            .get(&query_type)?
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, factor)| *factor)
    }
}

fn regex(name: &str, pattern: &str) -> Result<Regex, PatternError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| PatternError::InvalidRegex {
            set: name.to_string(),
            source,
        })
}

fn regex_set(name: &str, patterns: &[String]) -> Result<RegexSet, PatternError> {
    RegexSetBuilder::new(patterns)
        .case_insensitive(true)
        .build()
        .map_err(|source| PatternError::InvalidRegex {
            set: name.to_string(),
            source,
        })
}

fn unit_interval(field: &str, value: f32) -> Result<(), PatternError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PatternError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

// ═══════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════

/// Holds the current table and swaps it atomically on reload.
pub struct PatternStore {
    current: RwLock<Arc<PatternTable>>,
    source: Option<PathBuf>,
}

impl PatternStore {
    pub fn new(table: PatternTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(table)),
            source: None,
        }
    }

    /// Load from a file and remember the path for `reload`.
    pub fn from_file(path: &Path) -> Result<Self, PatternError> {
        let table = PatternTable::load(path)?;
        Ok(Self {
            current: RwLock::new(Arc::new(table)),
            source: Some(path.to_path_buf()),
        })
    }

    /// The table a request should use from start to finish.
    pub fn snapshot(&self) -> Arc<PatternTable> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn replace(&self, table: PatternTable) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(table);
    }

    /// Re-read the source file. On failure the current table stays active.
    pub fn reload(&self) -> Result<String, PatternError> {
        let path = self.source.as_deref().ok_or(PatternError::NoSource)?;
        let table = PatternTable::load(path)?;
        let version = table.version.clone();
        self.replace(table);
        tracing::info!(version = %version, "Pattern table reloaded");
        Ok(version)
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}
