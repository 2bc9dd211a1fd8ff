use crate::error::{GeneratorError, Result};
use crate::generator::{extract_json_block, ContentGenerator};
use crate::utils::{file_slug, save_json, timestamped_path};
use crate::{log_error, log_info, log_warn};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Low,
    Medium,
    High,
    Ultra,
}

impl DetailLevel {
    /// Total lesson length in minutes.
    pub fn minutes(self) -> u32 {
        match self {
            DetailLevel::Low => 15,
            DetailLevel::Medium => 45,
            DetailLevel::High => 90,
            DetailLevel::Ultra => 180,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetailLevel::Low => "low",
            DetailLevel::Medium => "medium",
            DetailLevel::High => "high",
            DetailLevel::Ultra => "ultra",
        }
    }
}

impl FromStr for DetailLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(DetailLevel::Low),
            "medium" => Ok(DetailLevel::Medium),
            "high" => Ok(DetailLevel::High),
            "ultra" => Ok(DetailLevel::Ultra),
            other => Err(format!("unknown detail level: {}", other)),
        }
    }
}

impl fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub title: String,
    pub level: DetailLevel,
}

/// One topic per non-blank line, optionally suffixed with `/ level`.
/// An unrecognised level falls back to medium.
pub fn parse_topics(text: &str) -> Vec<Topic> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut parts = line.split('/');
            let title = parts.next()?.trim().to_string();
            if title.is_empty() {
                return None;
            }
            let level = match parts.last() {
                Some(level) => level.parse().unwrap_or_else(|e| {
                    log_warn!("[lessons] {} for \"{}\", using medium", e, title);
                    DetailLevel::Medium
                }),
                None => DetailLevel::Medium,
            };
            Some(Topic { title, level })
        })
        .collect()
}

pub fn read_topics(path: impl AsRef<Path>) -> Result<Vec<Topic>> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_topics(&text))
}

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub title: String,
    pub duration: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub key_points: Vec<String>,
    pub objectives: Option<String>,
    pub content: Option<String>,
    pub code_example: Option<String>,
    /// Never requested at the low detail level.
    pub analogy: Option<String>,
    pub pitfalls: Option<String>,
    pub best_practices: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Lesson {
    pub topic: String,
    pub detail_level: DetailLevel,
    pub total_minutes: u32,
    pub language: String,
    pub difficulty: String,
    pub model: String,
    pub created: String,
    pub sections: Vec<Section>,
    pub assessments: Option<Assessments>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessments {
    /// Checks for understanding during the lesson.
    #[serde(default)]
    pub formative: Vec<String>,
    /// Task that shows mastery afterwards.
    #[serde(default)]
    pub summative: String,
}

#[derive(Deserialize)]
struct Outline {
    #[serde(default)]
    sections: Vec<OutlineSection>,
}

#[derive(Deserialize)]
struct OutlineSection {
    title: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    key_points: Vec<String>,
}

/// Splits `total` minutes evenly; the remainder goes to the first sections.
pub fn balance_durations(total: u32, sections: usize) -> Vec<u32> {
    if sections == 0 {
        return Vec::new();
    }
    let n = sections as u32;
    (0..n)
        .map(|i| total / n + u32::from(i < total % n))
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Part {
    Objectives,
    Content,
    CodeExample,
    Analogy,
    Pitfalls,
    BestPractices,
}

impl Part {
    const ALL: [Part; 6] = [
        Part::Objectives,
        Part::Content,
        Part::CodeExample,
        Part::Analogy,
        Part::Pitfalls,
        Part::BestPractices,
    ];

    fn label(self) -> &'static str {
        match self {
            Part::Objectives => "objectives",
            Part::Content => "content",
            Part::CodeExample => "code example",
            Part::Analogy => "analogy",
            Part::Pitfalls => "pitfalls",
            Part::BestPractices => "best practices",
        }
    }

    fn applies_to(self, level: DetailLevel) -> bool {
        !matches!((self, level), (Part::Analogy, DetailLevel::Low))
    }

    fn ask(self) -> &'static str {
        match self {
            Part::Objectives => "List 3 to 5 concrete learning objectives for this section.",
            Part::Content => "Write the teaching content for this section: a clear definition and an explanation.",
            Part::CodeExample => {
                "Give a short, commented code example that demonstrates this section. \
                 Return only a fenced Markdown code block."
            }
            Part::Analogy => "Give a short everyday analogy that makes this section's idea easier to grasp.",
            Part::Pitfalls => {
                "Describe the most common pitfalls for this section, each with how to avoid it."
            }
            Part::BestPractices => "List the best practices for this section, each with a one-line reason.",
        }
    }
}

/// Builds lessons by asking the generator for an outline and then for each
/// section's parts.
pub struct LessonBuilder<'a> {
    generator: &'a dyn ContentGenerator,
    language: String,
    difficulty: String,
}

impl<'a> LessonBuilder<'a> {
    pub fn new(generator: &'a dyn ContentGenerator, language: &str, difficulty: &str) -> Self {
        Self {
            generator,
            language: language.to_string(),
            difficulty: difficulty.to_string(),
        }
    }

    fn outline_prompt(&self, topic: &Topic) -> String {
        format!(
            r#"You are an experienced teacher preparing a {difficulty} lesson.

[IMPORTANT] Respond ONLY with valid JSON.

Create the structure of a lesson on: "{title}".
Language: {language}.
Detail level: {level}.
Total time: {minutes} minutes.

Structure (JSON):
{{
    "sections": [
        {{"title": "Section title", "duration": 15, "type": "introduction", "key_points": ["Point 1", "Point 2"]}}
    ]
}}

Rules:
* Section durations add up to {minutes}.
* Vary section types ("introduction", "theory", "practice", "discussion", "summary").
* Give key_points for every section.
* ONLY valid JSON."#,
            difficulty = self.difficulty,
            title = topic.title,
            language = self.language,
            level = topic.level,
            minutes = topic.level.minutes(),
        )
    }

    fn part_prompt(&self, topic: &Topic, section: &Section, part: Part) -> String {
        format!(
            "Lesson topic: \"{}\". Section: \"{}\" ({}, {} minutes).\n\
             Key points: {}.\nLanguage: {}. Audience: {}. Detail level: {}.\n\n{}",
            topic.title,
            section.title,
            section.kind,
            section.duration,
            section.key_points.join("; "),
            self.language,
            self.difficulty,
            topic.level,
            part.ask()
        )
    }

    /// Fails only when the outline cannot be obtained or parsed.
    pub async fn build(&self, topic: &Topic) -> Result<Lesson> {
        log_info!("[lessons] Generating: {}, level: {}", topic.title, topic.level);

        let raw = self.generator.generate(&self.outline_prompt(topic)).await?;
        let json = extract_json_block(&raw).ok_or_else(|| {
            GeneratorError::MalformedResponse(format!("no JSON outline for \"{}\"", topic.title))
        })?;
        let outline: Outline = serde_json::from_str(json)
            .map_err(|e| GeneratorError::MalformedResponse(format!("outline: {}", e)))?;

        if outline.sections.is_empty() {
            return Err(GeneratorError::MalformedResponse(format!(
                "outline for \"{}\" has no sections",
                topic.title
            ))
            .into());
        }

        let durations = balance_durations(topic.level.minutes(), outline.sections.len());
        let mut sections: Vec<Section> = outline
            .sections
            .into_iter()
            .zip(durations)
            .map(|(s, duration)| Section {
                title: s.title,
                duration,
                kind: s.kind,
                key_points: s.key_points,
                objectives: None,
                content: None,
                code_example: None,
                analogy: None,
                pitfalls: None,
                best_practices: None,
            })
            .collect();

        let total = sections.len();
        for (index, section) in sections.iter_mut().enumerate() {
            log_info!("[lessons] Section {}/{}: {}", index + 1, total, section.title);
            for part in Part::ALL.into_iter().filter(|p| p.applies_to(topic.level)) {
                let text = match self.generator.generate(&self.part_prompt(topic, section, part)).await {
                    Ok(text) => Some(text.trim().to_string()),
                    Err(e) => {
                        log_warn!(
                            "[lessons] No {} for section \"{}\": {}",
                            part.label(),
                            section.title,
                            e
                        );
                        None
                    }
                };
                match part {
                    Part::Objectives => section.objectives = text,
                    Part::Content => section.content = text,
                    Part::CodeExample => section.code_example = text,
                    Part::Analogy => section.analogy = text,
                    Part::Pitfalls => section.pitfalls = text,
                    Part::BestPractices => section.best_practices = text,
                }
            }
        }

        let assessments = self.assessments(topic).await;

        Ok(Lesson {
            topic: topic.title.clone(),
            detail_level: topic.level,
            total_minutes: topic.level.minutes(),
            language: self.language.clone(),
            difficulty: self.difficulty.clone(),
            model: self.generator.model().to_string(),
            created: Local::now().to_rfc3339(),
            sections,
            assessments,
        })
    }

    fn assessments_prompt(&self, topic: &Topic) -> String {
        format!(
            r#"You are an experienced teacher.
Suggest assessments for a lesson on "{title}".
Difficulty: {difficulty}. Language: {language}. Detail level: {level}.

Include formative checks (during the lesson) and one summative task (after it).

Respond ONLY with JSON:
{{
    "formative": ["task 1", "task 2"],
    "summative": "final task"
}}"#,
            title = topic.title,
            difficulty = self.difficulty,
            language = self.language,
            level = topic.level,
        )
    }

    /// Missing or unparseable assessments leave the lesson without them.
    async fn assessments(&self, topic: &Topic) -> Option<Assessments> {
        let raw = match self.generator.generate(&self.assessments_prompt(topic)).await {
            Ok(raw) => raw,
            Err(e) => {
                log_warn!("[lessons] No assessments for \"{}\": {}", topic.title, e);
                return None;
            }
        };
        let parsed = extract_json_block(&raw).map(serde_json::from_str::<Assessments>);
        match parsed {
            Some(Ok(assessments)) => Some(assessments),
            Some(Err(e)) => {
                log_warn!("[lessons] Unreadable assessments for \"{}\": {}", topic.title, e);
                None
            }
            None => {
                log_warn!("[lessons] Assessments for \"{}\" carried no JSON", topic.title);
                None
            }
        }
    }

    /// Builds and writes every topic; a failed topic is logged and skipped.
    pub async fn build_all(&self, topics: &[Topic], out_dir: impl AsRef<Path>) -> Vec<PathBuf> {
        let mut written = Vec::new();
        for topic in topics {
            let result = match self.build(topic).await {
                Ok(lesson) => write_lesson(out_dir.as_ref(), &lesson),
                Err(e) => Err(e),
            };
            match result {
                Ok(path) => written.push(path),
                Err(e) => log_error!(e => "[lessons] Failed to generate \"{}\"", topic.title),
            }
        }
        written
    }
}

/// `<dir>/lesson_<topic>_<level>_<timestamp>.json`
pub fn write_lesson(dir: impl AsRef<Path>, lesson: &Lesson) -> Result<PathBuf> {
    let prefix = format!("lesson_{}_{}", file_slug(&lesson.topic), lesson.detail_level);
    let path = timestamped_path(dir, &prefix, "json", Local::now());
    save_json(lesson, &path)?;
    log_info!("[lessons] Saved {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::testing::Scripted;

    const OUTLINE: &str = r#"Sure! Here it is:
```json
{"sections": [
  {"title": "Intro", "duration": 40, "type": "introduction", "key_points": ["why"]},
  {"title": "Ownership", "duration": 40, "type": "theory", "key_points": ["moves", "borrows"]}
]}
```"#;

    #[test]
    fn topics_take_an_optional_level() {
        let topics = parse_topics("Traits / high\n\n  Lifetimes  \nMacros / bogus\nAsync/ULTRA\n");
        assert_eq!(
            topics,
            vec![
                Topic { title: "Traits".into(), level: DetailLevel::High },
                Topic { title: "Lifetimes".into(), level: DetailLevel::Medium },
                Topic { title: "Macros".into(), level: DetailLevel::Medium },
                Topic { title: "Async".into(), level: DetailLevel::Ultra },
            ]
        );
    }

    #[test]
    fn durations_spread_the_remainder_first() {
        assert_eq!(balance_durations(45, 4), vec![12, 11, 11, 11]);
        assert_eq!(balance_durations(15, 3), vec![5, 5, 5]);
        assert!(balance_durations(90, 0).is_empty());
    }

    #[tokio::test]
    async fn failed_parts_leave_gaps_but_keep_the_section() {
        let generator = Scripted::new(vec![
            Ok(OUTLINE.to_string()),
            Ok("objectives".to_string()),
            Err(GeneratorError::Upstream("500".to_string())),
        ]);
        let builder = LessonBuilder::new(&generator, "English", "intermediate");
        let topic = Topic { title: "Rust".into(), level: DetailLevel::Low };

        let lesson = builder.build(&topic).await.unwrap();
        assert_eq!(lesson.model, "scripted");
        assert_eq!(lesson.sections.len(), 2);
        assert_eq!(lesson.sections[0].duration, 8);
        assert_eq!(lesson.sections[1].duration, 7);
        assert_eq!(lesson.sections[0].objectives.as_deref(), Some("objectives"));
        assert!(lesson.sections[0].content.is_none());
        assert_eq!(lesson.sections[0].pitfalls.as_deref(), Some("done"));
        assert!(lesson.sections[0].analogy.is_none());
        assert!(lesson.assessments.is_none());
        assert_eq!(lesson.sections[1].key_points, vec!["moves", "borrows"]);
    }

    #[tokio::test]
    async fn analogy_and_assessments_above_low_level() {
        let outline = r#"{"sections": [{"title": "Borrowing", "type": "theory", "key_points": []}]}"#;
        let mut replies: Vec<_> = [
            outline,
            "objectives",
            "content",
            "```rust\nlet r = &v;\n```",
            "a library card",
            "pitfalls",
            "practices",
        ]
        .into_iter()
        .map(|r| Ok(r.to_string()))
        .collect();
        replies.push(Ok(
            r#"```json
{"formative": ["Who owns v?"], "summative": "Write a borrow checker kata"}
```"#
                .to_string(),
        ));
        let generator = Scripted::new(replies);
        let builder = LessonBuilder::new(&generator, "English", "intermediate");
        let topic = Topic { title: "Rust".into(), level: DetailLevel::High };

        let lesson = builder.build(&topic).await.unwrap();
        let section = &lesson.sections[0];
        assert_eq!(section.duration, 90);
        assert_eq!(section.code_example.as_deref(), Some("```rust\nlet r = &v;\n```"));
        assert_eq!(section.analogy.as_deref(), Some("a library card"));
        assert_eq!(section.best_practices.as_deref(), Some("practices"));
        assert_eq!(
            lesson.assessments,
            Some(Assessments {
                formative: vec!["Who owns v?".to_string()],
                summative: "Write a borrow checker kata".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn unparseable_outline_fails_the_topic() {
        let generator = Scripted::new(vec![Ok("I cannot help with that.".to_string())]);
        let builder = LessonBuilder::new(&generator, "English", "intermediate");
        let dir = tempfile::tempdir().unwrap();
        let topic = Topic { title: "Rust".into(), level: DetailLevel::Medium };

        assert!(builder.build_all(&[topic], dir.path()).await.is_empty());
    }

    #[tokio::test]
    async fn lessons_are_written_as_json() {
        let generator = Scripted::new(vec![Ok(OUTLINE.to_string())]);
        let builder = LessonBuilder::new(&generator, "English", "beginner");
        let dir = tempfile::tempdir().unwrap();
        let topic = Topic { title: "Smart pointers".into(), level: DetailLevel::Medium };

        let written = builder.build_all(&[topic], dir.path()).await;
        assert_eq!(written.len(), 1);
        let name = written[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("lesson_Smart_pointers_medium_"));

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(value["sections"][1]["type"], "theory");
        assert_eq!(value["detail_level"], "medium");
        assert_eq!(value["sections"][0]["duration"], 23);
    }
}
