use bounty_core::BountyError;

/// What a submission URL points at.
///
/// # Examples
///
/// ```
/// use bounty_context::url::{parse_submission_url, SubmissionTarget};
///
/// let target = parse_submission_url("https://github.com/o/r/pull/7").unwrap();
/// assert_eq!(
///     target,
///     SubmissionTarget::PullRequest { owner: "o".into(), repo: "r".into(), number: 7 }
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionTarget {
    /// `github.com/<owner>/<repo>/pull/<number>`
    PullRequest {
        owner: String,
        repo: String,
        number: u64,
    },
    /// `github.com/<owner>/<repo>`
    Repository { owner: String, repo: String },
}

impl SubmissionTarget {
    /// `owner/repo` of the target.
    pub fn slug(&self) -> String {
        match self {
            SubmissionTarget::PullRequest { owner, repo, .. }
            | SubmissionTarget::Repository { owner, repo } => format!("{owner}/{repo}"),
        }
    }
}

const HOST: &str = "github.com/";

/// Resolve a submission URL into a pull request or repository target.
///
/// The pull-request shape is tried first; owner and repo segments are taken
/// verbatim. Anything after `/pull/<digits>` (such as `/files`) is ignored.
///
/// # Errors
///
/// Returns [`BountyError::InvalidReference`] if the URL does not name a
/// GitHub repository.
///
/// # Examples
///
/// ```
/// use bounty_context::url::{parse_submission_url, SubmissionTarget};
///
/// let target = parse_submission_url("https://github.com/rust-lang/rust").unwrap();
/// assert!(matches!(target, SubmissionTarget::Repository { .. }));
///
/// assert!(parse_submission_url("https://example.com/not-github").is_err());
/// ```
pub fn parse_submission_url(url: &str) -> Result<SubmissionTarget, BountyError> {
    let invalid = || BountyError::InvalidReference(url.to_string());

    let path = host_suffix(url).ok_or_else(invalid)?;
    let mut segments = path.split('/');
    let owner = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let repo = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;

    if segments.next() == Some("pull") {
        if let Some(number) = segments.next().and_then(leading_number) {
            return Ok(SubmissionTarget::PullRequest {
                owner: owner.to_string(),
                repo: repo.to_string(),
                number,
            });
        }
    }

    Ok(SubmissionTarget::Repository {
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

/// Everything after the first `github.com/` that starts a host name.
fn host_suffix(url: &str) -> Option<&str> {
    let mut from = 0;
    while let Some(pos) = url[from..].find(HOST) {
        let start = from + pos;
        let boundary = start == 0 || matches!(url.as_bytes()[start - 1], b'/' | b'.' | b'@');
        if boundary {
            return Some(&url[start + HOST.len()..]);
        }
        from = start + HOST.len();
    }
    None
}

fn leading_number(segment: &str) -> Option<u64> {
    let digits: &str = segment
        .find(|c: char| !c.is_ascii_digit())
        .map_or(segment, |end| &segment[..end]);
    digits.parse().ok()
}
