use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::question::{AnswerValue, CorrectAnswer, Question, QuestionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Correct,
    Incorrect,
    Blank,
    /// Answered essay still waiting for a manual grade.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub question_id: Uuid,
    pub outcome: ItemOutcome,
    pub points_awarded: Decimal,
    pub max_points: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptScore {
    pub score: Decimal,
    pub correct_answers: i32,
    pub pending_manual_score: Decimal,
    pub max_score: Decimal,
    pub items: Vec<ScoredItem>,
}

/// Stateless scoring of answers against answer keys.
pub struct ScoringService;

impl ScoringService {
    pub fn outcome(question: &Question, answer: Option<&AnswerValue>) -> ItemOutcome {
        let Some(answer) = answer.filter(|a| !a.is_blank()) else {
            return ItemOutcome::Blank;
        };
        if question.question_type == QuestionType::Essay {
            return ItemOutcome::Pending;
        }
        let correct = match (&question.correct_answer, answer) {
            (Some(CorrectAnswer::Choice(key)), AnswerValue::Choice(given)) => given.trim() == key,
            (Some(CorrectAnswer::Boolean(expected)), AnswerValue::Boolean(given)) => {
                given == expected
            }
            (Some(CorrectAnswer::Text(accepted)), AnswerValue::Text(given)) => {
                let given = given.trim().to_lowercase();
                accepted.iter().any(|a| a.trim().to_lowercase() == given)
            }
            (Some(CorrectAnswer::Pairs(expected)), AnswerValue::Pairs(given)) => given == expected,
            _ => false,
        };
        if correct {
            ItemOutcome::Correct
        } else {
            ItemOutcome::Incorrect
        }
    }

    pub fn score_item(question: &Question, points: i32, answer: Option<&AnswerValue>) -> ScoredItem {
        let outcome = Self::outcome(question, answer);
        let max_points = Decimal::from(points);
        let points_awarded = if outcome == ItemOutcome::Correct {
            max_points
        } else {
            Decimal::ZERO
        };
        ScoredItem {
            question_id: question.id,
            outcome,
            points_awarded,
            max_points,
        }
    }

    /// Scores `items` (question plus effective points) in the given order.
    /// Essay points stay out of `score` and are reported as pending unless a
    /// manual grade already exists for them.
    pub fn score_attempt(
        items: &[(&Question, i32)],
        answers: &BTreeMap<Uuid, AnswerValue>,
        manual_scores: &BTreeMap<Uuid, Decimal>,
    ) -> AttemptScore {
        let mut score = Decimal::ZERO;
        let mut correct_answers = 0;
        let mut pending = Decimal::ZERO;
        let mut max_score = Decimal::ZERO;
        let mut scored = Vec::with_capacity(items.len());

        for (question, points) in items {
            let item = Self::score_item(question, *points, answers.get(&question.id));
            max_score += item.max_points;
            match item.outcome {
                ItemOutcome::Correct => {
                    score += item.points_awarded;
                    correct_answers += 1;
                }
                ItemOutcome::Pending if !manual_scores.contains_key(&question.id) => {
                    pending += item.max_points;
                }
                _ => {}
            }
            scored.push(item);
        }

        AttemptScore {
            score,
            correct_answers,
            pending_manual_score: pending,
            max_score,
            items: scored,
        }
    }

    /// Option keys picked by `answer`, as tallied for option statistics.
    pub fn picked_options(question: &Question, answer: Option<&AnswerValue>) -> Vec<String> {
        match (question.question_type, answer) {
            (QuestionType::MultipleChoice, Some(AnswerValue::Choice(key))) if !key.trim().is_empty() => {
                vec![key.trim().to_string()]
            }
            (QuestionType::Matching, Some(AnswerValue::Pairs(pairs))) => pairs
                .iter()
                .map(|(left, right)| pair_key(left, right))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Option keys considered correct for option statistics.
    pub fn correct_options(question: &Question) -> Vec<String> {
        match &question.correct_answer {
            Some(CorrectAnswer::Choice(key)) => vec![key.clone()],
            Some(CorrectAnswer::Pairs(pairs)) => pairs
                .iter()
                .map(|(left, right)| pair_key(left, right))
                .collect(),
            _ => Vec::new(),
        }
    }
}

pub fn pair_key(left: &str, right: &str) -> String {
    format!("{}->{}", left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionOption;
    use chrono::Utc;

    fn question(question_type: QuestionType, correct_answer: Option<CorrectAnswer>) -> Question {
        Question {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            question_type,
            content: "q".into(),
            options: ["a", "b", "c", "x", "y"]
                .iter()
                .map(|k| QuestionOption {
                    key: k.to_string(),
                    text: k.to_uppercase(),
                    match_text: None,
                })
                .collect(),
            correct_answer,
            explanation: None,
            points: 2,
            difficulty_level: 3,
            stimulus_id: None,
            subject_id: None,
            created_by: Uuid::nil(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn fill_blank_is_trimmed_and_case_insensitive() {
        let q = question(
            QuestionType::FillBlank,
            Some(CorrectAnswer::Text(vec!["Paris".into(), "Paree".into()])),
        );
        let answer = AnswerValue::Text("  paris ".into());
        assert_eq!(ScoringService::outcome(&q, Some(&answer)), ItemOutcome::Correct);
        let answer = AnswerValue::Text("Lyon".into());
        assert_eq!(ScoringService::outcome(&q, Some(&answer)), ItemOutcome::Incorrect);
    }

    #[test]
    fn matching_requires_every_pair() {
        let mut pairs = BTreeMap::new();
        pairs.insert("a".to_string(), "x".to_string());
        pairs.insert("b".to_string(), "y".to_string());
        let q = question(QuestionType::Matching, Some(CorrectAnswer::Pairs(pairs.clone())));
        assert_eq!(
            ScoringService::outcome(&q, Some(&AnswerValue::Pairs(pairs.clone()))),
            ItemOutcome::Correct
        );
        pairs.insert("b".to_string(), "x".to_string());
        assert_eq!(
            ScoringService::outcome(&q, Some(&AnswerValue::Pairs(pairs))),
            ItemOutcome::Incorrect
        );
    }

    #[test]
    fn missing_and_empty_answers_are_blank() {
        let q = question(QuestionType::MultipleChoice, Some(CorrectAnswer::Choice("a".into())));
        assert_eq!(ScoringService::outcome(&q, None), ItemOutcome::Blank);
        assert_eq!(
            ScoringService::outcome(&q, Some(&AnswerValue::Choice(" ".into()))),
            ItemOutcome::Blank
        );
    }

    #[test]
    fn essay_points_are_pending_not_scored() {
        let mc = question(QuestionType::MultipleChoice, Some(CorrectAnswer::Choice("a".into())));
        let tf = question(QuestionType::TrueFalse, Some(CorrectAnswer::Boolean(true)));
        let essay = question(QuestionType::Essay, None);

        let mut answers = BTreeMap::new();
        answers.insert(mc.id, AnswerValue::Choice("a".into()));
        answers.insert(tf.id, AnswerValue::Boolean(false));
        answers.insert(essay.id, AnswerValue::Text("long form".into()));

        let result = ScoringService::score_attempt(
            &[(&mc, 3), (&tf, 2), (&essay, 5)],
            &answers,
            &BTreeMap::new(),
        );
        assert_eq!(result.score, Decimal::from(3));
        assert_eq!(result.correct_answers, 1);
        assert_eq!(result.pending_manual_score, Decimal::from(5));
        assert_eq!(result.max_score, Decimal::from(10));
    }

    #[test]
    fn graded_essays_are_no_longer_pending() {
        let essay = question(QuestionType::Essay, None);
        let mut answers = BTreeMap::new();
        answers.insert(essay.id, AnswerValue::Text("done".into()));
        let mut manual = BTreeMap::new();
        manual.insert(essay.id, Decimal::from(4));

        let result = ScoringService::score_attempt(&[(&essay, 5)], &answers, &manual);
        assert_eq!(result.pending_manual_score, Decimal::ZERO);
        assert_eq!(result.score, Decimal::ZERO);
    }
}
