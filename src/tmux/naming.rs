//! Deterministic tmux session names for recipe windows.
//!
//! `train_<recipe>_<job8>_<index>`: the recipe part is lowercased with every
//! run of non-alphanumerics folded into one `_`, the job part is the first
//! eight characters of the job id.

const SESSION_PREFIX: &str = "train";
const JOB_ID_CHARS: usize = 8;

/// Title given to bridge panes so a later process can find them again.
pub fn bridge_pane_title(window: &str) -> String {
    format!("train:{window}")
}

pub fn sanitize_recipe_name(name: &str) -> String {
    let mut out = String::new();
    let mut last_was_sep = false;
    for c in name.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    let out = out.trim_matches('_').to_string();
    if out.is_empty() {
        "recipe".to_string()
    } else {
        out
    }
}

pub fn short_job_id(job_id: &str) -> String {
    job_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(JOB_ID_CHARS)
        .collect::<String>()
        .to_lowercase()
}

fn session_prefix(recipe_name: &str, job_id: &str) -> String {
    format!(
        "{SESSION_PREFIX}_{}_{}_",
        sanitize_recipe_name(recipe_name),
        short_job_id(job_id)
    )
}

pub fn get_window_session_name(recipe_name: &str, job_id: &str, index: u32) -> String {
    format!("{}{index}", session_prefix(recipe_name, job_id))
}

/// Inverse of [`get_window_session_name`]; `None` for sessions of another recipe or job.
pub fn parse_window_session_index(session: &str, recipe_name: &str, job_id: &str) -> Option<u32> {
    let rest = session.strip_prefix(&session_prefix(recipe_name, job_id))?;
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

/// Hands out session names for one job. Shared by recipe windows and the
/// detached bridge session so the two never collide.
#[derive(Debug, Clone)]
pub struct SessionNamer {
    recipe_name: String,
    job_id: String,
    next_index: u32,
}

impl SessionNamer {
    pub fn new(recipe_name: &str, job_id: &str, next_index: u32) -> Self {
        Self {
            recipe_name: recipe_name.to_string(),
            job_id: job_id.to_string(),
            next_index,
        }
    }

    pub fn allocate(&mut self) -> String {
        let name = get_window_session_name(&self.recipe_name, &self.job_id, self.next_index);
        self.next_index += 1;
        name
    }

    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Never hand out `index` (or anything below it) again.
    pub fn reserve_through(&mut self, index: u32) {
        self.next_index = self.next_index.max(index.saturating_add(1));
    }

    pub fn raise_to(&mut self, next_index: u32) {
        self.next_index = self.next_index.max(next_index);
    }

    pub fn index_of(&self, session: &str) -> Option<u32> {
        parse_window_session_index(session, &self.recipe_name, &self.job_id)
    }
}
