use bounty_core::{BountyError, GitHubContext, ReviewConfig, ReviewContext, ReviewResult};
use serde::Deserialize;

const INTRO: &str = "You are an expert code reviewer evaluating a GitHub submission for a bounty.";

const INSTRUCTIONS: &str = "\
## Review Instructions
1. Evaluate how well the submission meets the bounty requirements
2. Assess code quality, structure, and best practices
3. Check for completeness and functionality
4. Provide constructive feedback

## Output Format
Provide a JSON object with:
- **score**: A number from 0-100 representing how well the submission meets requirements
- **notes**: Concise, actionable feedback (2-4 sentences)
- **labels**: Array of relevant labels (e.g., [\"meets-criteria\", \"needs-refactor\", \"incomplete\", \"excellent-quality\"])

Base your analysis ONLY on the provided context. Be objective and fair.";

/// `response_format` sent with every completion.
///
/// Plain JSON mode, which every chat model accepts, including the default
/// `gpt-4-turbo-preview`. The reply shape is checked by
/// [`parse_review_response`]. JSON mode needs the word "JSON" in the prompt,
/// which [`build_review_prompt`] always includes.
///
/// # Examples
///
/// ```
/// use bounty_review::prompt::response_format;
///
/// assert_eq!(response_format()["type"], "json_object");
/// ```
pub fn response_format() -> serde_json::Value {
    serde_json::json!({ "type": "json_object" })
}

/// Build the single review prompt for a submission.
///
/// Embeds the bounty requirements verbatim, a summary of the GitHub
/// context, and the (truncated) contents of every key file.
///
/// # Examples
///
/// ```
/// use bounty_core::{GitHubContext, RepoContext, ReviewConfig, ReviewContext, SubmissionRef};
/// use bounty_review::prompt::build_review_prompt;
///
/// let ctx = ReviewContext {
///     github_context: GitHubContext::Repo(RepoContext {
///         name: "widget".into(),
///         description: String::new(),
///         language: "Rust".into(),
///         stars: 3,
///         forks: 1,
///         created_at: String::new(),
///         updated_at: String::new(),
///         key_files: vec![],
///         recent_commits: vec![],
///     }),
///     bounty_requirements: "Build a widget".into(),
///     submission: SubmissionRef::new("https://github.com/o/widget", "B1"),
/// };
/// let prompt = build_review_prompt(&ctx, &ReviewConfig::default());
/// assert!(prompt.contains("Build a widget"));
/// assert!(prompt.contains("**Name:** widget"));
/// ```
pub fn build_review_prompt(context: &ReviewContext, limits: &ReviewConfig) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("{INTRO}\n\n"));
    prompt.push_str(&format!(
        "## Bounty Requirements\n{}\n\n",
        context.bounty_requirements
    ));
    prompt.push_str(&context_section(&context.github_context, limits));

    let key_files = context.github_context.key_files();
    if !key_files.is_empty() {
        prompt.push_str("\n## Key File Contents\n");
        let sections: Vec<String> = key_files
            .iter()
            .map(|f| {
                format!(
                    "### {}\n```\n{}\n```",
                    f.filename,
                    truncate(&f.content, limits.max_key_file_chars)
                )
            })
            .collect();
        prompt.push_str(&sections.join("\n\n"));
        prompt.push('\n');
    }

    prompt.push_str(&format!("\n{INSTRUCTIONS}"));
    prompt
}

fn context_section(context: &GitHubContext, limits: &ReviewConfig) -> String {
    let mut s = String::new();
    match context {
        GitHubContext::Pr(pr) => {
            s.push_str("## Pull Request Information\n");
            s.push_str(&format!("- **Title:** {}\n", pr.title));
            s.push_str(&format!(
                "- **Description:** {}\n",
                or_placeholder(&pr.description)
            ));
            s.push_str(&format!("- **Author:** {}\n", pr.author));
            s.push_str(&format!("- **State:** {}\n", pr.state));
            s.push_str(&format!("- **Files Changed:** {} files\n", pr.files.len()));
            s.push_str(&format!("- **Commits:** {} commits\n", pr.commits.len()));
            s.push_str("\n### Key File Changes:\n");
            for f in pr.files.iter().take(limits.max_file_changes) {
                s.push_str(&format!(
                    "- {} ({}): +{}/-{}\n",
                    f.filename, f.status, f.additions, f.deletions
                ));
            }
            s.push_str("\n### Recent Commits:\n");
            for c in pr.commits.iter().take(limits.max_commit_messages) {
                s.push_str(&format!("- {}\n", c.message));
            }
        }
        GitHubContext::Repo(repo) => {
            s.push_str("## Repository Information\n");
            s.push_str(&format!("- **Name:** {}\n", repo.name));
            s.push_str(&format!(
                "- **Description:** {}\n",
                or_placeholder(&repo.description)
            ));
            let language = if repo.language.is_empty() {
                "Unknown"
            } else {
                &repo.language
            };
            s.push_str(&format!("- **Language:** {language}\n"));
            s.push_str(&format!("- **Stars:** {}\n", repo.stars));
            s.push_str(&format!("- **Forks:** {}\n", repo.forks));
            s.push_str("\n### Key Files:\n");
            for f in &repo.key_files {
                s.push_str(&format!("- {}\n", f.filename));
            }
            s.push_str("\n### Recent Commits:\n");
            for c in &repo.recent_commits {
                s.push_str(&format!("- {}\n", c.message));
            }
        }
    }
    s
}

fn or_placeholder(text: &str) -> &str {
    if text.trim().is_empty() {
        "No description provided"
    } else {
        text
    }
}

/// Keep the first `max_chars` characters, marking the cut with `...`.
fn truncate(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &content[..end]),
        None => content.to_string(),
    }
}

#[derive(Deserialize)]
struct LlmReview {
    score: f64,
    notes: String,
    labels: Vec<String>,
}

/// Parse and validate the structured review returned by the LLM.
///
/// Handles markdown code fences around JSON and drops duplicate labels
/// while keeping their first-seen order.
///
/// # Errors
///
/// Returns [`BountyError::Generation`] if the response does not match the
/// schema or the score falls outside `0..=100`.
///
/// # Examples
///
/// ```
/// use bounty_review::prompt::parse_review_response;
///
/// let json = r#"{"score": 82, "notes": "Solid implementation", "labels": ["meets-criteria"]}"#;
/// let result = parse_review_response(json).unwrap();
/// assert_eq!(result.score, 82.0);
/// ```
pub fn parse_review_response(response: &str) -> Result<ReviewResult, BountyError> {
    let cleaned = strip_code_fences(response);
    let parsed: LlmReview = serde_json::from_str(cleaned)
        .map_err(|e| BountyError::Generation(format!("response does not match schema: {e}")))?;

    if !parsed.score.is_finite() || !(0.0..=100.0).contains(&parsed.score) {
        return Err(BountyError::Generation(format!(
            "score {} is outside 0-100",
            parsed.score
        )));
    }

    let mut labels: Vec<String> = Vec::with_capacity(parsed.labels.len());
    for label in parsed.labels {
        if !labels.contains(&label) {
            labels.push(label);
        }
    }

    Ok(ReviewResult {
        score: parsed.score,
        notes: parsed.notes,
        labels,
    })
}

fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use bounty_core::{CommitInfo, FileChange, KeyFile, PrContext, SubmissionRef};

    fn pr_context(files: usize, commits: usize, readme: &str) -> ReviewContext {
        ReviewContext {
            github_context: GitHubContext::Pr(PrContext {
                pr_number: 7,
                title: "Implement X".into(),
                description: String::new(),
                state: "open".into(),
                author: "octocat".into(),
                created_at: String::new(),
                updated_at: String::new(),
                files: (0..files)
                    .map(|i| FileChange {
                        filename: format!("src/file{i}.rs"),
                        status: "modified".into(),
                        additions: 3,
                        deletions: 1,
                        patch: String::new(),
                    })
                    .collect(),
                commits: (0..commits)
                    .map(|i| CommitInfo {
                        sha: format!("sha{i}"),
                        message: format!("commit message {i}"),
                        author: "octocat".into(),
                        date: String::new(),
                    })
                    .collect(),
                key_files: vec![KeyFile {
                    filename: "README.md".into(),
                    content: readme.into(),
                }],
            }),
            bounty_requirements: "Implement X with tests".into(),
            submission: SubmissionRef::new("https://github.com/o/r/pull/7", "B1"),
        }
    }

    #[test]
    fn pr_prompt_summarizes_context() {
        let prompt = build_review_prompt(&pr_context(2, 1, "# X"), &ReviewConfig::default());
        assert!(prompt.contains("## Bounty Requirements\nImplement X with tests"));
        assert!(prompt.contains("- **Title:** Implement X"));
        assert!(prompt.contains("- **Description:** No description provided"));
        assert!(prompt.contains("- **Files Changed:** 2 files"));
        assert!(prompt.contains("- src/file1.rs (modified): +3/-1"));
        assert!(prompt.contains("- commit message 0"));
        assert!(prompt.contains("### README.md\n```\n# X\n```"));
    }

    #[test]
    fn pr_prompt_caps_file_and_commit_lists() {
        let prompt = build_review_prompt(&pr_context(30, 15, ""), &ReviewConfig::default());
        assert!(prompt.contains("- **Files Changed:** 30 files"));
        assert!(prompt.contains("src/file19.rs"));
        assert!(!prompt.contains("src/file20.rs"));
        assert!(prompt.contains("commit message 9"));
        assert!(!prompt.contains("commit message 10"));
    }

    #[test]
    fn long_key_files_are_truncated() {
        let readme = "a".repeat(2500);
        let prompt = build_review_prompt(&pr_context(0, 0, &readme), &ReviewConfig::default());
        let expected = format!("{}...\n```", "a".repeat(2000));
        assert!(prompt.contains(&expected));
        assert!(!prompt.contains(&"a".repeat(2001)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exact", 5), "exact");
    }

    #[test]
    fn prompt_asks_for_json() {
        let prompt = build_review_prompt(&pr_context(0, 0, ""), &ReviewConfig::default());
        assert_eq!(response_format()["type"], "json_object");
        assert!(prompt.contains("JSON object"));
    }

    #[test]
    fn parse_valid_response() {
        let json = r#"{"score": 82, "notes": "Solid implementation", "labels": ["meets-criteria", "meets-criteria", "tested"]}"#;
        let result = parse_review_response(json).unwrap();
        assert_eq!(result.score, 82.0);
        assert_eq!(result.notes, "Solid implementation");
        assert_eq!(result.labels, vec!["meets-criteria", "tested"]);
    }

    #[test]
    fn parse_with_code_fences() {
        let fenced = "```json\n{\"score\": 50.5, \"notes\": \"ok\", \"labels\": []}\n```";
        let result = parse_review_response(fenced).unwrap();
        assert_eq!(result.score, 50.5);
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        let err = parse_review_response(r#"{"score": 120, "notes": "", "labels": []}"#).unwrap_err();
        assert!(matches!(err, BountyError::Generation(_)));
    }

    #[test]
    fn missing_field_is_rejected() {
        let err = parse_review_response(r#"{"score": 50, "notes": "x"}"#).unwrap_err();
        assert!(err.to_string().contains("does not match schema"));
    }
}
