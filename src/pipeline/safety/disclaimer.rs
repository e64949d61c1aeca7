use crate::pipeline::patterns::PatternTable;
use crate::pipeline::rag::types::QueryType;

/// Pick the disclaimer template for a query type.
pub fn disclaimer_for(table: &PatternTable, query_type: QueryType) -> &str {
    let templates = &table.disclaimers;
    match query_type {
        QueryType::DrugInteraction | QueryType::MedicationInfo => &templates.medication,
        QueryType::SymptomCheck => &templates.symptom,
        QueryType::Emergency => &templates.emergency,
        QueryType::ChronicCare => &templates.chronic,
        QueryType::MentalHealth => &templates.mental_health,
        QueryType::Diagnostic | QueryType::GeneralHealth => &templates.general,
    }
}

pub fn append_disclaimer(text: &str, disclaimer: &str) -> String {
    format!("{text}\n\n**Medical Disclaimer:** {disclaimer}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medication_and_interaction_share_template() {
        let table = PatternTable::builtin();
        assert_eq!(
            disclaimer_for(&table, QueryType::DrugInteraction),
            disclaimer_for(&table, QueryType::MedicationInfo)
        );
        assert!(disclaimer_for(&table, QueryType::MedicationInfo).contains("pharmacist"));
    }

    #[test]
    fn each_family_has_its_own_text() {
        let table = PatternTable::builtin();
        assert!(disclaimer_for(&table, QueryType::Emergency).contains("911"));
        assert!(disclaimer_for(&table, QueryType::MentalHealth).contains("therapist"));
        assert!(disclaimer_for(&table, QueryType::ChronicCare).contains("Chronic"));
        assert!(disclaimer_for(&table, QueryType::SymptomCheck).contains("Symptom"));
        assert_eq!(
            disclaimer_for(&table, QueryType::Diagnostic),
            disclaimer_for(&table, QueryType::GeneralHealth)
        );
    }

    #[test]
    fn appended_with_marker() {
        let out = append_disclaimer("Answer.", "Be careful.");
        assert_eq!(out, "Answer.\n\n**Medical Disclaimer:** Be careful.");
    }
}
