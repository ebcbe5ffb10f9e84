// FeedbackService - scored coaching feedback for single answers and whole
// sessions, degrading to text heuristics when the model is unavailable.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument};

use super::client::ModelChain;
use super::parsing::{check_not_blank, check_score, parse_reply, truncate, Validate};
use super::questions::CONTEXT_CHAR_LIMIT;

pub const RESPONSE_CHAR_LIMIT: usize = 4000;
pub const SESSION_RESPONSE_CHAR_LIMIT: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedAnalysis {
    pub structure: String,
    pub content: String,
    pub delivery: String,
    pub impact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiFeedback {
    pub confidence: u8,
    pub clarity: u8,
    pub empathy: u8,
    pub relevance: u8,
    pub energy: u8,
    pub overall_score: u8,
    pub suggestions: Vec<String>,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub summary: String,
    pub detailed_analysis: DetailedAnalysis,
}

impl Validate for AiFeedback {
    fn validate(&self) -> Result<(), String> {
        check_score("confidence", self.confidence)?;
        check_score("clarity", self.clarity)?;
        check_score("empathy", self.empathy)?;
        check_score("relevance", self.relevance)?;
        check_score("energy", self.energy)?;
        check_score("overallScore", self.overall_score)?;
        check_not_blank("summary", &self.summary)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeContext {
    pub scenario: String,
    pub question: String,
    #[serde(default)]
    pub resume: Option<String>,
    #[serde(default)]
    pub job_description: Option<String>,
    #[serde(default)]
    pub expected_elements: Vec<String>,
    #[serde(default)]
    pub question_category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub question: String,
    pub response: String,
    #[serde(default)]
    pub expected_elements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFeedbackContext {
    pub scenario: String,
    #[serde(default)]
    pub resume: Option<String>,
    #[serde(default)]
    pub job_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInsights {
    pub consistency_score: u8,
    pub improvement_trend: String,
    pub key_themes: Vec<String>,
    pub recommended_focus: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFeedback {
    pub question: String,
    pub response: String,
    pub feedback: AiFeedback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFeedback {
    pub overall_feedback: AiFeedback,
    pub individual_responses: Vec<ResponseFeedback>,
    pub session_insights: SessionInsights,
}

/// Shape the model is asked to return for a session.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionReply {
    overall_feedback: AiFeedback,
    session_insights: SessionInsights,
    #[serde(default)]
    individual_responses: Vec<AiFeedback>,
}

impl Validate for SessionReply {
    fn validate(&self) -> Result<(), String> {
        self.overall_feedback.validate()?;
        check_score("consistencyScore", self.session_insights.consistency_score)?;
        self.individual_responses.iter().try_for_each(Validate::validate)
    }
}

#[derive(Clone)]
pub struct FeedbackService {
    chain: Arc<ModelChain>,
}

impl FeedbackService {
    pub fn new(chain: Arc<ModelChain>) -> Self {
        Self { chain }
    }

    #[instrument(skip_all, fields(scenario = %context.scenario))]
    pub async fn analyze_response(&self, response: &str, context: &PracticeContext) -> AiFeedback {
        let prompt = analysis_prompt(&truncate(response, RESPONSE_CHAR_LIMIT), context);
        match self.chain.generate(&prompt).await {
            Ok(text) => parse_reply::<AiFeedback>(&text)
                .unwrap_or_else(|| heuristic_feedback(response, &context.scenario)),
            Err(e) => {
                error!(error = %e, "response analysis failed");
                heuristic_feedback(response, &context.scenario)
            }
        }
    }

    #[instrument(skip_all, fields(scenario = %context.scenario, responses = responses.len()))]
    pub async fn analyze_full_session(
        &self,
        responses: &[SessionResponse],
        context: &SessionFeedbackContext,
    ) -> SessionFeedback {
        let prompt = session_prompt(responses, context);
        match self.chain.generate(&prompt).await {
            Ok(text) => match parse_reply::<SessionReply>(&text) {
                Some(reply) => assemble_session(reply, responses, &context.scenario),
                None => heuristic_session_feedback(responses, &context.scenario),
            },
            Err(e) => {
                error!(error = %e, "session analysis failed");
                heuristic_session_feedback(responses, &context.scenario)
            }
        }
    }
}

fn assemble_session(reply: SessionReply, responses: &[SessionResponse], scenario: &str) -> SessionFeedback {
    let mut per_response = reply.individual_responses.into_iter();
    let individual_responses = responses
        .iter()
        .map(|r| ResponseFeedback {
            question: r.question.clone(),
            response: r.response.clone(),
            feedback: per_response
                .next()
                .unwrap_or_else(|| heuristic_feedback(&r.response, scenario)),
        })
        .collect();

    SessionFeedback {
        overall_feedback: reply.overall_feedback,
        individual_responses,
        session_insights: reply.session_insights,
    }
}

const FEEDBACK_SCHEMA: &str = "{\"confidence\": 0-100, \"clarity\": 0-100, \"empathy\": 0-100, \
    \"relevance\": 0-100, \"energy\": 0-100, \"overallScore\": 0-100, \
    \"strengths\": [\"...\"], \"improvements\": [\"...\"], \"suggestions\": [\"...\"], \
    \"detailedAnalysis\": {\"structure\": \"...\", \"content\": \"...\", \"delivery\": \"...\", \"impact\": \"...\"}, \
    \"summary\": \"...\"}";

fn analysis_prompt(response: &str, context: &PracticeContext) -> String {
    let mut background = String::new();
    if !context.expected_elements.is_empty() {
        background.push_str(&format!("- Expected elements: {}\n", context.expected_elements.join(", ")));
    }
    if let Some(resume) = context.resume.as_deref().filter(|r| !r.is_empty()) {
        background.push_str(&format!("- Candidate background: {}\n", truncate(resume, 500)));
    }
    if let Some(jd) = context.job_description.as_deref().filter(|j| !j.is_empty()) {
        background.push_str(&format!("- Target role: {}\n", truncate(jd, 500)));
    }

    format!(
        "You are an expert interview coach. Score the candidate's answer and give actionable feedback.\n\n\
         CONTEXT:\n- Scenario: {scenario}\n- Question: {question}\n- Question category: {category}\n{background}\n\
         ANSWER:\n\"{response}\"\n\n\
         Score confidence, clarity, empathy, relevance and energy from 0 to 100 and give an overall score. \
         List three strengths, three improvements and three next-step suggestions, each tied to the answer. \
         Analyse structure, content, delivery and impact, then summarise in two or three sentences.\n\n\
         Reply with one JSON object only:\n{schema}",
        scenario = context.scenario,
        question = context.question,
        category = context.question_category.as_deref().unwrap_or("General"),
        background = background,
        response = response,
        schema = FEEDBACK_SCHEMA,
    )
}

fn session_prompt(responses: &[SessionResponse], context: &SessionFeedbackContext) -> String {
    let transcript = responses
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "Q{n}: {q}\nA{n}: {a}\n",
                n = i + 1,
                q = r.question,
                a = truncate(&r.response, SESSION_RESPONSE_CHAR_LIMIT)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut background = String::new();
    if let Some(resume) = context.resume.as_deref().filter(|r| !r.is_empty()) {
        background.push_str(&format!("- Candidate background: {}\n", truncate(resume, CONTEXT_CHAR_LIMIT)));
    }
    if let Some(jd) = context.job_description.as_deref().filter(|j| !j.is_empty()) {
        background.push_str(&format!("- Target role: {}\n", truncate(jd, CONTEXT_CHAR_LIMIT)));
    }

    format!(
        "You are an expert interview coach reviewing a complete {scenario} session.\n\n\
         CONTEXT:\n- Scenario: {scenario}\n{background}\n\
         SESSION:\n{transcript}\n\
         Assess overall performance, consistency across answers, the trend through the session, \
         recurring themes and what to practise next.\n\n\
         Reply with one JSON object only:\n\
         {{\"overallFeedback\": {schema}, \"individualResponses\": [{schema}], \
         \"sessionInsights\": {{\"consistencyScore\": 0-100, \"improvementTrend\": \"...\", \
         \"keyThemes\": [\"...\"], \"recommendedFocus\": [\"...\"]}}}}",
        scenario = context.scenario,
        background = background,
        transcript = transcript,
        schema = FEEDBACK_SCHEMA,
    )
}

fn clamp_score(value: i32, min: i32, max: i32) -> u8 {
    value.clamp(min, max) as u8
}

/// Text-feature scoring used when no model reply is usable.
pub fn heuristic_feedback(response: &str, scenario: &str) -> AiFeedback {
    let word_count = response.split(' ').count();
    let lower = response.to_lowercase();
    let has_metrics = response.chars().any(|c| c.is_ascii_digit());
    let has_structure = ["First", "Next", "Then"].iter().any(|w| response.contains(w));
    let has_examples = ["example", "instance", "time when"].iter().any(|w| response.contains(w));

    let bonus = |cond: bool, points: i32| if cond { points } else { 0 };

    let confidence = clamp_score(60 + bonus(word_count > 50, 15) + bonus(has_examples, 10), 40, 95);
    let clarity = if has_structure {
        85
    } else {
        clamp_score(70 - bonus(word_count > 200, 10), 50, 100)
    };
    let empathy = if lower.contains("team") || lower.contains("understand") { 80 } else { 65 };
    let relevance = if lower.contains(&scenario.to_lowercase()) { 85 } else { 70 };
    let energy = if response.contains('!') || response.contains("excited") || response.contains("passionate") {
        80
    } else {
        70
    };
    let overall_score = clamp_score(
        65 + bonus(has_metrics, 10) + bonus(has_structure, 10) + bonus(has_examples, 10),
        50,
        90,
    );

    let summary = format!(
        "{} response that {}could be strengthened with more specific metrics and {}.",
        if has_structure { "Well-structured" } else { "Adequate" },
        if has_examples { "included examples but " } else { "" },
        if has_structure { "energy" } else { "better organization" },
    );

    AiFeedback {
        confidence,
        clarity,
        empathy,
        relevance,
        energy,
        overall_score,
        suggestions: vec![
            "Include specific metrics and quantifiable results".to_string(),
            "Use the STAR method (Situation, Task, Action, Result) for better structure".to_string(),
            "Practice speaking with more confidence and energy".to_string(),
        ],
        strengths: vec![
            if word_count > 30 { "Good response length and detail" } else { "Concise and to the point" }.to_string(),
            if has_examples { "Used concrete examples" } else { "Clear communication style" }.to_string(),
            if has_structure { "Well-organized response" } else { "Direct and focused answer" }.to_string(),
        ],
        improvements: vec![
            "Add more specific examples from your experience".to_string(),
            "Include quantifiable outcomes and impact metrics".to_string(),
            "Structure responses with clear beginning, middle, and end".to_string(),
        ],
        summary,
        detailed_analysis: DetailedAnalysis {
            structure: if has_structure {
                "Response had good logical flow"
            } else {
                "Could benefit from clearer structure using frameworks like STAR"
            }
            .to_string(),
            content: if has_examples {
                "Good use of specific examples"
            } else {
                "Would benefit from more concrete examples and details"
            }
            .to_string(),
            delivery: if word_count > 100 {
                "Comprehensive response"
            } else {
                "Could be more detailed and thorough"
            }
            .to_string(),
            impact: if has_metrics {
                "Included measurable outcomes"
            } else {
                "Would be stronger with quantifiable results and impact"
            }
            .to_string(),
        },
    }
}

pub fn heuristic_session_feedback(responses: &[SessionResponse], scenario: &str) -> SessionFeedback {
    let total_words: usize = responses.iter().map(|r| r.response.split(' ').count()).sum();
    let avg_words = if responses.is_empty() {
        0.0
    } else {
        total_words as f64 / responses.len() as f64
    };

    let combined = responses
        .iter()
        .map(|r| r.response.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    SessionFeedback {
        overall_feedback: heuristic_feedback(&combined, scenario),
        individual_responses: responses
            .iter()
            .map(|r| ResponseFeedback {
                question: r.question.clone(),
                response: r.response.clone(),
                feedback: heuristic_feedback(&r.response, scenario),
            })
            .collect(),
        session_insights: SessionInsights {
            consistency_score: clamp_score(75 + if avg_words > 50.0 { 10 } else { -10 }, 60, 90),
            improvement_trend: if responses.len() > 3 {
                "Showed improvement throughout session"
            } else {
                "Consistent performance"
            }
            .to_string(),
            key_themes: vec![
                "Communication skills".to_string(),
                "Professional experience".to_string(),
                "Problem-solving approach".to_string(),
            ],
            recommended_focus: vec![
                "Practice with more specific examples".to_string(),
                "Work on quantifying achievements".to_string(),
                "Improve response structure and flow".to_string(),
            ],
        },
    }
}
