//! Fixed wellness endpoints under `/api/v1/mental-health/`. Each takes one line of free
//! text which is shaped into the query or body that endpoint expects.

use reqwest::Method;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::api::{self, ApiClient, ApiError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellnessTool {
    EmotionAssessment,
    CopingStrategies,
    Meditation,
    SleepAdvice,
    StudyWellness,
    SelfCarePlan,
    Resources,
    MoodTracker,
}

/// A shaped wellness request, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct WellnessRequest {
    pub method: Method,
    pub path: &'static str,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<Value>,
}

impl WellnessTool {
    pub const ALL: [WellnessTool; 8] = [
        WellnessTool::EmotionAssessment,
        WellnessTool::CopingStrategies,
        WellnessTool::Meditation,
        WellnessTool::SleepAdvice,
        WellnessTool::StudyWellness,
        WellnessTool::SelfCarePlan,
        WellnessTool::Resources,
        WellnessTool::MoodTracker,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            WellnessTool::EmotionAssessment => "emotion_assessment",
            WellnessTool::CopingStrategies => "coping_strategies",
            WellnessTool::Meditation => "meditation",
            WellnessTool::SleepAdvice => "sleep_advice",
            WellnessTool::StudyWellness => "study_wellness",
            WellnessTool::SelfCarePlan => "self_care_plan",
            WellnessTool::Resources => "resources",
            WellnessTool::MoodTracker => "mood_tracker",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WellnessTool::EmotionAssessment => "Emotion Assessment",
            WellnessTool::CopingStrategies => "Coping Strategies",
            WellnessTool::Meditation => "Meditation Guide",
            WellnessTool::SleepAdvice => "Sleep Advice",
            WellnessTool::StudyWellness => "Study Wellness",
            WellnessTool::SelfCarePlan => "Self-Care Plan",
            WellnessTool::Resources => "Mental Health Resources",
            WellnessTool::MoodTracker => "Mood Tracker",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            WellnessTool::EmotionAssessment => {
                "Analyze your emotional state and provide recommendations"
            }
            WellnessTool::CopingStrategies => "Get coping methods for specific emotions",
            WellnessTool::Meditation => {
                "Provide meditation practice guidance for different levels"
            }
            WellnessTool::SleepAdvice => "Professional advice to improve sleep quality",
            WellnessTool::StudyWellness => "Mental health advice during the learning process",
            WellnessTool::SelfCarePlan => "Create personalized self-care plans",
            WellnessTool::Resources => {
                "Get professional resources and emergency contact information"
            }
            WellnessTool::MoodTracker => "Generate mood tracking templates",
        }
    }

    /// What the input line should contain.
    pub fn input_hint(&self) -> &'static str {
        match self {
            WellnessTool::EmotionAssessment => "Describe how you feel today...",
            WellnessTool::CopingStrategies => "emotion[, intensity] e.g. anxiety, high",
            WellnessTool::Meditation => "level[, type] e.g. beginner, body scan",
            WellnessTool::SelfCarePlan => "preferences: meditation, exercise, journaling",
            _ => "no input needed",
        }
    }

    fn path(&self) -> &'static str {
        match self {
            WellnessTool::EmotionAssessment => "/mental-health/assess",
            WellnessTool::CopingStrategies => "/mental-health/coping-strategies",
            WellnessTool::Meditation => "/mental-health/meditation",
            WellnessTool::SleepAdvice => "/mental-health/sleep-advice",
            WellnessTool::StudyWellness => "/mental-health/study-wellness",
            WellnessTool::SelfCarePlan => "/mental-health/self-care-plan",
            WellnessTool::Resources => "/mental-health/resources",
            WellnessTool::MoodTracker => "/mental-health/mood-tracker",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            WellnessTool::SleepAdvice
            | WellnessTool::StudyWellness
            | WellnessTool::Resources
            | WellnessTool::MoodTracker => Method::GET,
            _ => Method::POST,
        }
    }

    /// Shape the input line into this endpoint's request.
    pub fn request(&self, input: &str) -> WellnessRequest {
        let mut query = Vec::new();
        let mut body = None;
        match self {
            WellnessTool::EmotionAssessment => body = Some(json!({ "message": input })),
            WellnessTool::CopingStrategies => {
                let (emotion, intensity) = split_pair(input);
                query.push(("emotion", emotion));
                query.push(("intensity", intensity.unwrap_or_else(|| "medium".to_string())));
            }
            WellnessTool::Meditation => {
                let (level, kind) = split_pair(input);
                let level = Some(level).filter(|l| !l.is_empty());
                query.push(("level", level.unwrap_or_else(|| "beginner".to_string())));
                query.push((
                    "type",
                    kind.unwrap_or_else(|| "breathing meditation".to_string()),
                ));
            }
            WellnessTool::SelfCarePlan => {
                body = Some(json!({
                    "preferences": {
                        "meditation": input.contains("meditation"),
                        "exercise": input.contains("exercise"),
                        "journaling": input.contains("journaling"),
                    }
                }))
            }
            _ => {}
        }
        WellnessRequest {
            method: self.method(),
            path: self.path(),
            query,
            body,
        }
    }

    /// Send the shaped request and return the backend's JSON answer.
    pub async fn run(&self, api: &ApiClient, input: &str) -> Result<Value, ApiError> {
        let req = self.request(input);
        let url = api.v1(req.path);
        let mut builder = if req.method == Method::GET {
            api.get(&url)
        } else {
            api.post(&url)
        };
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }
        log::debug!("wellness: {} {}", req.method, url);
        let res = builder.send().await?;
        api::read_json(res).await
    }
}

/// "a, b" -> ("a", Some("b")); missing or blank second part -> None.
fn split_pair(input: &str) -> (String, Option<String>) {
    let mut parts = input.split(',').map(str::trim);
    let first = parts.next().unwrap_or_default().to_string();
    let second = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
    (first, second)
}

impl fmt::Display for WellnessTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for WellnessTool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase().replace('-', "_");
        WellnessTool::ALL
            .into_iter()
            .find(|t| t.id() == s || (s == "assess" && *t == WellnessTool::EmotionAssessment))
            .ok_or_else(|| format!("unknown wellness tool: {}", s))
    }
}
