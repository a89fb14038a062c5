//! Team composition rules.
//!
//! # Invariants
//! - An accepted team has between 1 and `max_team_size` members.
//! - Exactly one member is the lead, and the lead has display order 1.
//! - Member keys are non-blank, well-formed and unique.

use super::error::{FieldError, WorkflowError, WorkflowResult};
use crate::model::identity::StudentKey;
use crate::model::submission::TeamMember;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

static MEMBER_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,31}$").expect("valid member key regex"));

/// One requested team member as sent by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInput {
    pub key: StudentKey,
    #[serde(default)]
    pub is_lead: bool,
}

impl MemberInput {
    pub fn new(key: impl Into<StudentKey>) -> Self {
        Self {
            key: key.into(),
            is_lead: false,
        }
    }
}

/// Puts `lead` at the head of the team and demotes every other lead flag.
///
/// The lead is inserted when absent. Duplicates are kept so that
/// `validate_team` can report them.
pub fn normalize_team(lead: &StudentKey, members: &[MemberInput]) -> Vec<TeamMember> {
    let mut ordered: Vec<&StudentKey> = Vec::with_capacity(members.len() + 1);
    if !members.iter().any(|member| member.key == *lead) {
        ordered.push(lead);
    }
    // Lead entries first, everyone else in request order.
    ordered.extend(members.iter().filter(|m| m.key == *lead).map(|m| &m.key));
    ordered.extend(members.iter().filter(|m| m.key != *lead).map(|m| &m.key));

    ordered
        .into_iter()
        .enumerate()
        .map(|(index, key)| TeamMember {
            member_key: key.clone(),
            is_lead: key == lead,
            display_order: u32::try_from(index + 1).unwrap_or(u32::MAX),
        })
        .collect()
}

pub fn validate_team(members: &[TeamMember], max_team_size: usize) -> WorkflowResult<()> {
    if members.is_empty() {
        return Err(invalid("members", "team must have at least one member"));
    }
    if members.len() > max_team_size {
        return Err(invalid(
            "members",
            format!(
                "team has {} members, at most {max_team_size} are allowed",
                members.len()
            ),
        ));
    }

    let mut seen = HashSet::with_capacity(members.len());
    for (index, member) in members.iter().enumerate() {
        let field = format!("members[{index}].key");
        if member.member_key.is_blank() {
            return Err(invalid(field, "member key is required"));
        }
        if !MEMBER_KEY_RE.is_match(member.member_key.as_str()) {
            return Err(invalid(field, "member key is malformed"));
        }
        if !seen.insert(member.member_key.as_str()) {
            return Err(invalid(
                field,
                format!("{} appears more than once", member.member_key),
            ));
        }
    }

    let leads: Vec<&TeamMember> = members.iter().filter(|member| member.is_lead).collect();
    match leads.as_slice() {
        [lead] if lead.display_order == 1 => Ok(()),
        [_] => Err(invalid("members", "team lead must be listed first")),
        [] => Err(invalid("members", "team must have exactly one lead")),
        _ => Err(invalid(
            "members",
            format!("team has {} leads, exactly one is allowed", leads.len()),
        )),
    }
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> WorkflowError {
    WorkflowError::Validation(FieldError::new(field, message))
}
