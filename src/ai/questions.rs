// QuestionGenerator - personalised practice questions with static fallbacks.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument};

use super::client::ModelChain;
use super::parsing::{check_not_blank, parse_reply, truncate, Validate};

pub const CONTEXT_CHAR_LIMIT: usize = 2000;
/// Prior Q/A pairs embedded in a next-question prompt.
const HISTORY_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    pub question: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub expected_elements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_up_questions: Vec<String>,
}

impl Validate for GeneratedQuestion {
    fn validate(&self) -> Result<(), String> {
        check_not_blank("question", &self.question)?;
        check_not_blank("category", &self.category)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub experience: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub scenario: String,
    #[serde(default)]
    pub resume: Option<String>,
    #[serde(default)]
    pub job_description: Option<String>,
    #[serde(default)]
    pub user_profile: Option<CandidateProfile>,
}

impl SessionContext {
    fn truncated(&self) -> Self {
        Self {
            resume: self.resume.as_deref().map(|r| truncate(r, CONTEXT_CHAR_LIMIT)),
            job_description: self
                .job_description
                .as_deref()
                .map(|j| truncate(j, CONTEXT_CHAR_LIMIT)),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub response: String,
}

#[derive(Deserialize)]
struct QuestionSet {
    questions: Vec<GeneratedQuestion>,
}

impl Validate for QuestionSet {
    fn validate(&self) -> Result<(), String> {
        if self.questions.is_empty() {
            return Err("no questions".to_string());
        }
        self.questions.iter().try_for_each(Validate::validate)
    }
}

/// A single question, or a set whose first entry is used.
#[derive(Deserialize)]
#[serde(untagged)]
enum NextQuestionReply {
    Single(GeneratedQuestion),
    Set(QuestionSet),
}

impl Validate for NextQuestionReply {
    fn validate(&self) -> Result<(), String> {
        match self {
            NextQuestionReply::Single(q) => q.validate(),
            NextQuestionReply::Set(set) => set.validate(),
        }
    }
}

impl NextQuestionReply {
    fn into_question(self) -> Option<GeneratedQuestion> {
        match self {
            NextQuestionReply::Single(q) => Some(q),
            NextQuestionReply::Set(set) => set.questions.into_iter().next(),
        }
    }
}

#[derive(Clone)]
pub struct QuestionGenerator {
    chain: Arc<ModelChain>,
}

impl QuestionGenerator {
    pub fn new(chain: Arc<ModelChain>) -> Self {
        Self { chain }
    }

    /// Generate `count` questions. Falls back to the scenario's static set
    /// when every model fails or the reply does not parse.
    #[instrument(skip(self, context), fields(scenario = %context.scenario))]
    pub async fn generate_questions(&self, context: &SessionContext, count: usize) -> Vec<GeneratedQuestion> {
        let prompt = question_prompt(&context.truncated(), count);
        match self.chain.generate(&prompt).await {
            Ok(text) => match parse_reply::<QuestionSet>(&text) {
                Some(set) => set.questions,
                None => fallback_questions(&context.scenario),
            },
            Err(e) => {
                error!(error = %e, "question generation failed");
                fallback_questions(&context.scenario)
            }
        }
    }

    /// One follow-up question that builds on the latest answers.
    #[instrument(skip(self, context, history), fields(scenario = %context.scenario))]
    pub async fn generate_next_question(&self, context: &SessionContext, history: &[QaPair]) -> GeneratedQuestion {
        let prompt = next_question_prompt(&context.truncated(), history);
        match self.chain.generate(&prompt).await {
            Ok(text) => parse_reply::<NextQuestionReply>(&text)
                .and_then(NextQuestionReply::into_question)
                .unwrap_or_else(|| competency_fallback(context.job_description.as_deref())),
            Err(e) => {
                error!(error = %e, "next question generation failed");
                competency_fallback(context.job_description.as_deref())
            }
        }
    }
}

fn context_block(context: &SessionContext) -> String {
    let mut block = String::new();
    if let Some(resume) = context.resume.as_deref().filter(|r| !r.is_empty()) {
        block.push_str(&format!("CANDIDATE RESUME:\n{}\n\n", resume));
    }
    if let Some(jd) = context.job_description.as_deref().filter(|j| !j.is_empty()) {
        block.push_str(&format!("JOB DESCRIPTION:\n{}\n\n", jd));
    }
    block.push_str(&format!("SCENARIO: {}\n", context.scenario));
    if let Some(experience) = context
        .user_profile
        .as_ref()
        .and_then(|p| p.experience.as_deref())
    {
        block.push_str(&format!("CANDIDATE EXPERIENCE: {}\n", experience));
    }
    block
}

fn question_prompt(context: &SessionContext, count: usize) -> String {
    format!(
        "You are an expert interviewer. Write {count} personalised questions for a {scenario} practice session.\n\n\
         {context}\n\
         Questions should reference the candidate's background or the role where possible, \
         start easy and grow harder, and assess the competencies the role needs.\n\
         For each question give its category, a difficulty of easy, medium or hard, \
         the elements a strong answer includes, and optional follow-ups.\n\n\
         Reply with one JSON object only:\n\
         {{\"questions\": [{{\"question\": \"...\", \"category\": \"behavioral\", \"difficulty\": \"medium\", \
         \"expectedElements\": [\"...\"], \"followUpQuestions\": [\"...\"]}}]}}",
        count = count,
        scenario = context.scenario,
        context = context_block(context),
    )
}

fn next_question_prompt(context: &SessionContext, history: &[QaPair]) -> String {
    let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
    let conversation = if recent.is_empty() {
        "(no prior Q/A)".to_string()
    } else {
        recent
            .iter()
            .enumerate()
            .map(|(i, qa)| format!("{}. Q: {}\nA: {}", i + 1, qa.question, qa.response))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are an expert interviewer running a realistic interview.\n\n\
         {context}\
         CONVERSATION SO FAR:\n{conversation}\n\n\
         Ask ONE follow-up question that continues naturally from the latest answer and probes \
         for specifics relevant to the role and the candidate. Avoid generic openers. If nothing \
         specific stands out, ask a competency question such as leadership, prioritisation or \
         problem solving.\n\n\
         Reply with one JSON object only:\n\
         {{\"question\": \"...\", \"category\": \"leadership\", \"difficulty\": \"medium\", \
         \"expectedElements\": [\"...\"], \"followUpQuestions\": [\"...\"]}}",
        context = context_block(context),
        conversation = conversation,
    )
}

fn question(text: &str, category: &str, difficulty: Difficulty, expected: [&str; 3]) -> GeneratedQuestion {
    GeneratedQuestion {
        question: text.to_string(),
        category: category.to_string(),
        difficulty,
        expected_elements: expected.iter().map(|e| e.to_string()).collect(),
        follow_up_questions: Vec::new(),
    }
}

/// Static question set for a scenario; unknown scenarios get the interview set.
pub fn fallback_questions(scenario: &str) -> Vec<GeneratedQuestion> {
    use Difficulty::*;
    match scenario {
        "Stand-up Meetings" => vec![
            question("What did you accomplish yesterday?", "progress", Easy, ["specific tasks", "outcomes", "blockers resolved"]),
            question("What are your priorities for today?", "planning", Easy, ["clear priorities", "time estimates", "dependencies"]),
            question("Are there any blockers or challenges you're facing?", "problem-solving", Medium, ["specific issues", "help needed", "proposed solutions"]),
            question("How does your work align with the sprint goals?", "alignment", Medium, ["sprint connection", "impact", "progress tracking"]),
            question("What support do you need from the team?", "collaboration", Easy, ["specific requests", "clear timeline", "mutual benefit"]),
        ],
        "Pitching Startups" => vec![
            question("What problem are you solving and why does it matter?", "problem", Easy, ["clear problem statement", "market size", "urgency"]),
            question("What's your unique solution and competitive advantage?", "solution", Medium, ["differentiation", "technology", "barriers to entry"]),
            question("Who is your target customer and how do you reach them?", "market", Medium, ["customer segments", "acquisition strategy", "validation"]),
            question("What's your business model and revenue projections?", "business", Hard, ["revenue streams", "unit economics", "growth projections"]),
            question("What funding do you need and how will you use it?", "funding", Hard, ["funding amount", "use of funds", "milestones"]),
        ],
        _ => vec![
            question("Tell me about yourself and your background.", "introduction", Easy, ["relevant experience", "key skills", "career goals"]),
            question("Describe a challenging project you've worked on recently.", "behavioral", Medium, ["specific challenge", "your approach", "measurable outcome"]),
            question("How do you handle working under pressure or tight deadlines?", "behavioral", Medium, ["specific strategy", "real example", "positive outcome"]),
            question("Tell me about a time you had to influence someone without direct authority.", "leadership", Hard, ["context", "influence strategy", "successful outcome"]),
            question("Why are you interested in this role and our company?", "motivation", Medium, ["company research", "role alignment", "career goals"]),
        ],
    }
}

/// Competency question picked from job-description keywords.
pub fn competency_fallback(job_description: Option<&str>) -> GeneratedQuestion {
    let jd = job_description.unwrap_or_default().to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| jd.contains(w));

    if mentions(&["manager", "lead", "team"]) {
        question(
            "Describe a time you led a team to deliver a project. What challenges did you face and how did you resolve them?",
            "leadership",
            Difficulty::Medium,
            ["context", "actions taken", "outcome"],
        )
    } else if mentions(&["engineer", "technical", "python", "react"]) {
        question(
            "Describe a technically challenging problem you solved. What was the root cause and how did you address it?",
            "technical",
            Difficulty::Medium,
            ["problem description", "approach", "measured impact"],
        )
    } else {
        question(
            "Describe a time you had to prioritize conflicting demands. How did you decide and what was the result?",
            "problem-solving",
            Difficulty::Medium,
            ["criteria used", "decision", "outcome"],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::tests::{chain, ScriptedModel};

    fn generator(model: ScriptedModel) -> QuestionGenerator {
        QuestionGenerator::new(Arc::new(chain(Arc::new(model))))
    }

    fn context(scenario: &str) -> SessionContext {
        SessionContext {
            scenario: scenario.to_string(),
            ..SessionContext::default()
        }
    }

    #[tokio::test]
    async fn test_failing_provider_returns_interview_fallback() {
        let questions = generator(ScriptedModel::failing())
            .generate_questions(&context("Interviews"), 5)
            .await;
        assert_eq!(questions, fallback_questions("Interviews"));
        assert_eq!(questions.len(), 5);
        assert_eq!(questions[0].question, "Tell me about yourself and your background.");
    }

    #[tokio::test]
    async fn test_scenario_specific_fallbacks() {
        let standup = generator(ScriptedModel::failing())
            .generate_questions(&context("Stand-up Meetings"), 5)
            .await;
        assert_eq!(standup[0].question, "What did you accomplish yesterday?");

        let unknown = fallback_questions("Negotiation");
        assert_eq!(unknown, fallback_questions("Interviews"));
    }

    #[tokio::test]
    async fn test_parses_generated_questions() {
        let reply = r#"Sure! {"questions": [{"question": "How did you speed up the React app?", "category": "technical", "difficulty": "hard", "expectedElements": ["profiling"]}]}"#;
        let questions = generator(ScriptedModel::replying(reply))
            .generate_questions(&context("Interviews"), 1)
            .await;
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].difficulty, Difficulty::Hard);
    }

    #[tokio::test]
    async fn test_unparseable_reply_uses_scenario_fallback() {
        let reply = r#"{"questions": [{"question": "", "category": "x", "difficulty": "easy", "expectedElements": []}]}"#;
        let questions = generator(ScriptedModel::replying(reply))
            .generate_questions(&context("Pitching Startups"), 5)
            .await;
        assert_eq!(questions, fallback_questions("Pitching Startups"));
    }

    #[tokio::test]
    async fn test_next_question_accepts_single_or_wrapped() {
        let single = r#"{"question": "What did you learn?", "category": "growth", "difficulty": "easy", "expectedElements": []}"#;
        let q = generator(ScriptedModel::replying(single))
            .generate_next_question(&context("Interviews"), &[])
            .await;
        assert_eq!(q.question, "What did you learn?");

        let wrapped = r#"{"questions": [{"question": "Why?", "category": "motivation", "difficulty": "medium", "expectedElements": []}]}"#;
        let q = generator(ScriptedModel::replying(wrapped))
            .generate_next_question(&context("Interviews"), &[])
            .await;
        assert_eq!(q.category, "motivation");
    }

    #[tokio::test]
    async fn test_next_question_competency_fallback_by_keywords() {
        let mut ctx = context("Interviews");
        ctx.job_description = Some("Senior Python Engineer".to_string());
        let q = generator(ScriptedModel::failing()).generate_next_question(&ctx, &[]).await;
        assert_eq!(q.category, "technical");

        assert_eq!(competency_fallback(Some("Engineering Manager")).category, "leadership");
        assert_eq!(competency_fallback(None).category, "problem-solving");
    }

    #[test]
    fn test_next_prompt_keeps_last_five_answers() {
        let history: Vec<QaPair> = (1..=7)
            .map(|i| QaPair {
                question: format!("q{}", i),
                response: format!("a{}", i),
            })
            .collect();
        let prompt = next_question_prompt(&context("Interviews"), &history);
        assert!(!prompt.contains("Q: q2\n"));
        assert!(prompt.contains("1. Q: q3\nA: a3"));
        assert!(prompt.contains("5. Q: q7\nA: a7"));
    }

    #[test]
    fn test_context_is_truncated() {
        let ctx = SessionContext {
            scenario: "Interviews".into(),
            resume: Some("r".repeat(CONTEXT_CHAR_LIMIT + 50)),
            job_description: Some("short".into()),
            user_profile: None,
        };
        let truncated = ctx.truncated();
        assert_eq!(truncated.resume.map(|r| r.len()), Some(CONTEXT_CHAR_LIMIT));
        assert_eq!(truncated.job_description.as_deref(), Some("short"));
    }
}
