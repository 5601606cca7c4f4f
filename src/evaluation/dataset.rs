use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An evaluation item, identified by its position in the question set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub index: usize,
    pub user_input: String,
    pub reference: String,
}

/// One row handed to the scoring oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalSample {
    pub question_index: usize,
    pub user_input: String,
    pub reference: String,
}

const EVAL_QUESTIONS: [(&str, &str); 8] = [
    (
        "What is the maximum contaminant level (MCL) for bromate?",
        "The MCL for bromate is 0.010 mg/L.",
    ),
    (
        "What are the best available technologies (BAT) for PFAS removal in drinking water?",
        "BAT for PFAS includes granular activated carbon (GAC), anion exchange resins, and \
         high-pressure membranes such as nanofiltration and reverse osmosis.",
    ),
    (
        "What CT value is required for 3-log inactivation of Giardia using ozone at 10\u{b0}C?",
        "The CT value for 3-log Giardia inactivation with ozone at 10\u{b0}C is approximately \
         1.43 mg\u{b7}min/L.",
    ),
    (
        "What is the Safe Drinking Water Act (SDWA) and what does it regulate?",
        "The SDWA is the federal law that protects public drinking water supplies by \
         authorizing EPA to set national health-based standards for contaminants in \
         drinking water.",
    ),
    (
        "What disinfection byproducts are regulated under the Stage 1 DBPR?",
        "The Stage 1 DBPR regulates total trihalomethanes (TTHM), haloacetic acids (HAA5), \
         bromate, and chlorite.",
    ),
    (
        "How does a sequencing batch reactor (SBR) treat wastewater?",
        "An SBR treats wastewater in a single tank through sequential phases: fill, react \
         (aeration), settle, decant, and idle.",
    ),
    (
        "What is the purpose of disinfection profiling and benchmarking under the LT1ESWTR?",
        "Disinfection profiling characterizes a system's existing disinfection practice to \
         ensure that any changes maintain adequate microbial inactivation.",
    ),
    (
        "What are the primary mechanisms by which ozone disinfects water?",
        "Ozone disinfects through direct oxidation by molecular ozone and indirect oxidation \
         by hydroxyl radicals produced during ozone decomposition.",
    ),
];

/// The built-in regulatory question set.
pub fn default_questions() -> Vec<Question> {
    EVAL_QUESTIONS
        .iter()
        .enumerate()
        .map(|(index, (user_input, reference))| Question {
            index,
            user_input: user_input.to_string(),
            reference: reference.to_string(),
        })
        .collect()
}

/// Rows for the oracle: every question, or only `indices` in the given order.
pub fn build_dataset(questions: &[Question], indices: Option<&[usize]>) -> Result<Vec<EvalSample>> {
    let to_sample = |q: &Question| EvalSample {
        question_index: q.index,
        user_input: q.user_input.clone(),
        reference: q.reference.clone(),
    };

    match indices {
        None => Ok(questions.iter().map(to_sample).collect()),
        Some(indices) => indices
            .iter()
            .map(|&i| {
                questions.get(i).map(to_sample).ok_or_else(|| {
                    Error::Usage(format!(
                        "question index {} out of range (have {} questions)",
                        i,
                        questions.len()
                    ))
                })
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_questions_indexed_in_order() {
        let questions = default_questions();
        assert_eq!(questions.len(), 8);
        for (i, q) in questions.iter().enumerate() {
            assert_eq!(q.index, i);
            assert!(!q.user_input.is_empty());
            assert!(!q.reference.is_empty());
        }
        assert!(questions[0].user_input.contains("bromate"));
        assert_eq!(questions[0].reference, "The MCL for bromate is 0.010 mg/L.");
    }

    #[test]
    fn test_build_full_dataset() {
        let questions = default_questions();
        let dataset = build_dataset(&questions, None).unwrap();
        assert_eq!(dataset.len(), questions.len());
        assert_eq!(dataset[3].question_index, 3);
    }

    #[test]
    fn test_build_subset_keeps_original_indices() {
        let questions = default_questions();
        let dataset = build_dataset(&questions, Some(&[2, 5])).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset[0].question_index, 2);
        assert_eq!(dataset[0].user_input, questions[2].user_input);
        assert_eq!(dataset[1].question_index, 5);
        assert_eq!(dataset[1].reference, questions[5].reference);
    }

    #[test]
    fn test_build_subset_out_of_range() {
        let questions = default_questions();
        let err = build_dataset(&questions, Some(&[1, 8])).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }
}
