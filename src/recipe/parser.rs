//! Recipe DSL parsing and rendering
//!
//! ```text
//! var MODEL = llama-7b
//! host gpu = root@1.2.3.4 -p 2222
//! storage out = r2:checkpoints
//! tmux.open @gpu as train
//! @train timeout=2h > python train.py --model $MODEL
//! wait @train "saved checkpoint" timeout=4h poll=1m
//! @gpu:/ckpt -> @out:$MODEL/
//! tmux.close @train
//! ```
//!
//! `$NAME` / `${NAME}` are resolved at parse time against the variables
//! defined so far; unknown names and `${secret:NAME}` are left for later.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use super::types::{
    ControlCommand, ControlStep, ExecuteStep, Recipe, Step, StepKind, TransferStep, WaitCondition,
    WaitStep,
};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}: {text}")]
pub struct ParseError {
    pub line: usize,
    pub text: String,
    pub message: String,
}

impl ParseError {
    fn new(line: usize, text: &str, message: impl Into<String>) -> Self {
        Self {
            line,
            text: text.to_string(),
            message: message.into(),
        }
    }
}

impl From<ParseError> for AppError {
    fn from(e: ParseError) -> Self {
        AppError::parse(e.to_string())
    }
}

// ============================================================
// Lexical helpers
// ============================================================

struct Patterns {
    binding: Regex,
    execute: Regex,
    heredoc: Regex,
    interpolation: Regex,
    name: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                binding: Regex::new(r"^(var|host|storage)\s+([^\s=]+)\s*=\s*(.*)$").ok()?,
                execute: Regex::new(r"^@([A-Za-z_][\w-]*)((?:\s+[a-z]+=\S+)*)\s*>(.*)$").ok()?,
                heredoc: Regex::new(r#"(?:^|[^<])<<(-?)\s*['"]?([A-Za-z_]\w*)['"]?"#).ok()?,
                interpolation: Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").ok()?,
                name: Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok()?,
            })
        })
        .as_ref()
}

/// Resolve `$NAME` and `${NAME}` from `vars`; anything unknown stays as written.
pub fn interpolate(text: &str, vars: &HashMap<String, String>) -> String {
    let Some(p) = patterns() else {
        return text.to_string();
    };
    p.interpolation
        .replace_all(text, |caps: &regex::Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or_default();
            match vars.get(name) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// `30s`, `5m`, `2h` or bare seconds.
pub fn parse_duration(text: &str) -> Result<u64, String> {
    let t = text.trim().to_lowercase();
    let (digits, scale) = match t.chars().last() {
        Some('s') => (&t[..t.len() - 1], 1),
        Some('m') => (&t[..t.len() - 1], 60),
        Some('h') => (&t[..t.len() - 1], 3600),
        _ => (t.as_str(), 1),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{text}' (use 30s, 5m, 2h or seconds)"))?;
    value
        .checked_mul(scale)
        .ok_or_else(|| format!("duration '{text}' is too large"))
}

/// Shortest duration literal for `secs`.
pub fn format_duration(secs: u64) -> String {
    if secs > 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

fn strip_quotes(value: &str) -> &str {
    let v = value.trim();
    for q in ['"', '\''] {
        if v.len() >= 2 && v.starts_with(q) && v.ends_with(q) {
            return &v[1..v.len() - 1];
        }
    }
    v
}

// ============================================================
// Logical lines
// ============================================================

struct LogicalLine {
    line: usize,
    text: String,
}

fn is_execute_form(text: &str) -> bool {
    patterns().map(|p| p.execute.is_match(text)).unwrap_or(false)
}

/// Drop blanks and comments; fold continuations and heredocs of execute lines.
fn logical_lines(source: &str) -> Result<Vec<LogicalLine>, ParseError> {
    let raw: Vec<&str> = source.lines().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < raw.len() {
        let start = i + 1;
        let trimmed = raw[i].trim();
        i += 1;
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if !is_execute_form(trimmed) {
            out.push(LogicalLine {
                line: start,
                text: trimmed.to_string(),
            });
            continue;
        }

        let mut text = trimmed.to_string();
        while text.ends_with('\\') {
            text.pop();
            let Some(next) = raw.get(i) else {
                return Err(ParseError::new(start, trimmed, "line continuation at end of file"));
            };
            i += 1;
            text = format!("{} {}", text.trim_end(), next.trim());
        }

        let heredoc = patterns()
            .and_then(|p| p.heredoc.captures(&text))
            .map(|c| c[2].to_string());
        if let Some(delim) = heredoc {
            let mut closed = false;
            while let Some(next) = raw.get(i) {
                i += 1;
                text.push('\n');
                text.push_str(next);
                if next.trim() == delim {
                    closed = true;
                    break;
                }
            }
            if !closed {
                return Err(ParseError::new(start, trimmed, format!("unterminated heredoc '{delim}'")));
            }
        }
        out.push(LogicalLine { line: start, text });
    }
    Ok(out)
}

// ============================================================
// Parser
// ============================================================

struct Parser {
    recipe: Recipe,
}

impl Parser {
    fn bind(&mut self, l: &LogicalLine, keyword: &str, name: &str, value: &str) -> Result<(), ParseError> {
        let valid = patterns().map(|p| p.name.is_match(name)).unwrap_or(false);
        if !valid {
            return Err(ParseError::new(l.line, &l.text, format!("invalid {keyword} name '{name}'")));
        }
        let r = &self.recipe;
        if r.variables.contains_key(name) || r.hosts.contains_key(name) || r.storages.contains_key(name) {
            return Err(ParseError::new(l.line, &l.text, format!("duplicate name '{name}'")));
        }
        let value = interpolate(strip_quotes(value), &self.recipe.variables);
        match keyword {
            "var" => self.recipe.variables.insert(name.to_string(), value),
            "host" => self.recipe.hosts.insert(name.to_string(), value),
            _ => self.recipe.storages.insert(name.to_string(), value),
        };
        Ok(())
    }

    fn wait(&self, l: &LogicalLine, rest: &str) -> Result<StepKind, ParseError> {
        let err = |m: String| ParseError::new(l.line, &l.text, m);
        let tokens = shell_words::split(rest).map_err(|e| err(format!("invalid quoting: {e}")))?;
        let mut tokens = tokens.into_iter();
        let target = tokens
            .next()
            .and_then(|t| t.strip_prefix('@').map(str::to_string))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| err("wait needs an @target".to_string()))?;

        let mut pattern = None;
        let mut file = None;
        let mut port = None;
        let mut idle = false;
        let mut timeout_secs = None;
        let mut poll_secs = None;
        for tok in tokens {
            if let Some(v) = tok.strip_prefix("file=") {
                file = Some(interpolate(v, &self.recipe.variables));
            } else if let Some(v) = tok.strip_prefix("port=") {
                let v = interpolate(v, &self.recipe.variables);
                port = Some(v.parse::<u16>().map_err(|_| err(format!("invalid port '{v}'")))?);
            } else if tok == "idle" {
                idle = true;
            } else if let Some(v) = tok.strip_prefix("timeout=") {
                timeout_secs = Some(parse_duration(v).map_err(err)?);
            } else if let Some(v) = tok.strip_prefix("poll=") {
                poll_secs = Some(parse_duration(v).map_err(err)?);
            } else if pattern.is_none() {
                pattern = Some(tok);
            } else {
                return Err(err(format!("unexpected wait argument '{tok}'")));
            }
        }

        let conditions = usize::from(file.is_some()) + usize::from(port.is_some()) + usize::from(idle);
        if conditions > 1 {
            return Err(err("wait takes only one of file=, port= and idle".to_string()));
        }
        if conditions == 1 && pattern.is_some() {
            return Err(err("a wait pattern cannot be combined with file=, port= or idle".to_string()));
        }
        let condition = match (file, port, idle, &pattern) {
            (Some(f), _, _, _) => WaitCondition::File(f),
            (None, Some(p), _, _) => WaitCondition::Port(p),
            (None, None, true, _) => WaitCondition::Idle,
            (None, None, false, Some(pat)) => {
                regex::Regex::new(pat).map_err(|e| err(format!("invalid pattern: {e}")))?;
                WaitCondition::Pattern
            }
            (None, None, false, None) => {
                return Err(err("wait needs a pattern, file=, port= or idle".to_string()))
            }
        };
        Ok(StepKind::Wait(WaitStep {
            target,
            pattern,
            condition,
            timeout_secs,
            poll_secs,
        }))
    }

    fn execute(&self, l: &LogicalLine, caps: &regex::Captures) -> Result<StepKind, ParseError> {
        let err = |m: String| ParseError::new(l.line, &l.text, m);
        let session = caps[1].to_string();
        let mut timeout_secs = 0;
        for opt in caps[2].split_whitespace() {
            match opt.split_once('=') {
                Some(("timeout", v)) => timeout_secs = parse_duration(v).map_err(err)?,
                _ => return Err(err(format!("unknown execute option '{opt}'"))),
            }
        }
        let mut command = caps[3].trim().to_string();
        let mut background = false;
        if command.ends_with('&') && !command.ends_with("&&") {
            command.pop();
            command = command.trim_end().to_string();
            background = true;
        }
        if command.is_empty() {
            return Err(err("empty command".to_string()));
        }
        Ok(StepKind::Execute(ExecuteStep {
            session,
            command: interpolate(&command, &self.recipe.variables),
            background,
            timeout_secs,
        }))
    }

    fn control(&self, l: &LogicalLine) -> Result<StepKind, ParseError> {
        let err = |m: String| ParseError::new(l.line, &l.text, m);
        let mut tokens = shell_words::split(&l.text).map_err(|e| err(format!("invalid quoting: {e}")))?;
        if tokens.is_empty() {
            return Err(err("empty line".to_string()));
        }
        let verb = tokens.remove(0);
        let command = ControlCommand::from_name(&verb).ok_or_else(|| err(format!("unknown command '{verb}'")))?;
        Ok(StepKind::Control(ControlStep { command, args: tokens }))
    }

    fn line(&mut self, l: &LogicalLine) -> Result<(), ParseError> {
        let Some(p) = patterns() else {
            return Err(ParseError::new(l.line, &l.text, "recipe grammar unavailable"));
        };
        if let Some(caps) = p.binding.captures(&l.text) {
            return self.bind(l, &caps[1], &caps[2], &caps[3]);
        }
        let kind = if let Some(rest) = l.text.strip_prefix("wait ") {
            self.wait(l, rest)?
        } else if let Some(caps) = p.execute.captures(&l.text) {
            self.execute(l, &caps)?
        } else if let Some((src, dst)) = l.text.split_once(" -> ") {
            let (src, dst) = (src.trim(), dst.trim());
            if src.is_empty() || dst.is_empty() {
                return Err(ParseError::new(l.line, &l.text, "transfer needs a source and a destination"));
            }
            StepKind::Transfer(TransferStep {
                source: interpolate(src, &self.recipe.variables),
                dest: interpolate(dst, &self.recipe.variables),
            })
        } else {
            self.control(l)?
        };
        self.recipe.steps.push(Step {
            line: l.line,
            raw: l.text.clone(),
            kind,
        });
        Ok(())
    }
}

/// Compile recipe source into a [`Recipe`].
pub fn parse_recipe(name: &str, source: &str) -> Result<Recipe, ParseError> {
    let mut parser = Parser {
        recipe: Recipe {
            name: name.to_string(),
            ..Default::default()
        },
    };
    for l in logical_lines(source)? {
        parser.line(&l)?;
    }
    Ok(parser.recipe)
}

// ============================================================
// Rendering
// ============================================================

fn render_value(value: &str) -> String {
    if value.is_empty() || value.trim() != value || strip_quotes(value) != value {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

impl Step {
    /// DSL text that parses back to this step.
    pub fn to_dsl(&self) -> String {
        match &self.kind {
            StepKind::Control(c) => {
                let mut parts = vec![c.command.as_str().to_string()];
                parts.extend(c.args.iter().map(|a| shell_words::quote(a).into_owned()));
                parts.join(" ")
            }
            StepKind::Execute(e) => {
                let mut head = format!("@{}", e.session);
                if e.timeout_secs > 0 {
                    head.push_str(&format!(" timeout={}", format_duration(e.timeout_secs)));
                }
                let tail = if e.background { " &" } else { "" };
                format!("{head} > {}{tail}", e.command)
            }
            StepKind::Transfer(t) => format!("{} -> {}", t.source, t.dest),
            StepKind::Wait(w) => {
                let mut parts = vec!["wait".to_string(), format!("@{}", w.target)];
                if let Some(p) = &w.pattern {
                    parts.push(shell_words::quote(p).into_owned());
                }
                match &w.condition {
                    WaitCondition::File(f) => parts.push(shell_words::quote(&format!("file={f}")).into_owned()),
                    WaitCondition::Port(p) => parts.push(format!("port={p}")),
                    WaitCondition::Idle => parts.push("idle".to_string()),
                    WaitCondition::Pattern => {}
                }
                if let Some(t) = w.timeout_secs {
                    parts.push(format!("timeout={}", format_duration(t)));
                }
                if let Some(p) = w.poll_secs {
                    parts.push(format!("poll={}", format_duration(p)));
                }
                parts.join(" ")
            }
        }
    }
}

/// Defined variables mentioned in the value of `name`, other than itself.
fn variable_refs<'a>(vars: &'a HashMap<String, String>, name: &str) -> BTreeSet<&'a String> {
    let (Some(p), Some(value)) = (patterns(), vars.get(name)) else {
        return BTreeSet::new();
    };
    p.interpolation
        .captures_iter(value)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .filter(|m| m.as_str() != name)
        .filter_map(|m| vars.get_key_value(m.as_str()).map(|(k, _)| k))
        .collect()
}

/// Variables ordered so that one whose value still mentions `$OTHER` comes
/// before `OTHER` itself. Ties go by name.
fn variable_order(vars: &HashMap<String, String>) -> Vec<&String> {
    let mut pending: HashMap<&String, usize> = vars.keys().map(|k| (k, 0)).collect();
    for name in vars.keys() {
        for r in variable_refs(vars, name) {
            if let Some(n) = pending.get_mut(r) {
                *n += 1;
            }
        }
    }
    let mut ready: BTreeSet<&String> = pending.iter().filter(|(_, n)| **n == 0).map(|(k, _)| *k).collect();
    let mut out = Vec::with_capacity(vars.len());
    while let Some(name) = ready.pop_first() {
        pending.remove(name);
        out.push(name);
        for r in variable_refs(vars, name) {
            if let Some(n) = pending.get_mut(r) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(r);
                }
            }
        }
    }
    let mut rest: Vec<&String> = pending.into_keys().collect();
    rest.sort();
    out.extend(rest);
    out
}

/// Recipe source equivalent to `recipe`.
///
/// Hosts and storages come first, then the steps, then the variables. Every
/// `$NAME` still present in the parsed text referred to a variable that did
/// not exist yet at that point, and this order keeps it that way on re-parse.
pub fn render_recipe(recipe: &Recipe) -> String {
    let mut lines = Vec::new();
    for (keyword, map) in [("host", &recipe.hosts), ("storage", &recipe.storages)] {
        let mut names: Vec<&String> = map.keys().collect();
        names.sort();
        for name in names {
            lines.push(format!("{keyword} {name} = {}", render_value(&map[name])));
        }
    }
    lines.extend(recipe.steps.iter().map(Step::to_dsl));
    for name in variable_order(&recipe.variables) {
        lines.push(format!("var {name} = {}", render_value(&recipe.variables[name])));
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# fine-tune on a rented box
var MODEL = llama-7b
var OUT = /ckpt/${MODEL}
host gpu = root@1.2.3.4 -p 2222
storage r2 = r2:bucket
vast.pick @gpu gpu=RTX_4090 max_price=0.5
tmux.open @gpu as train
@train timeout=2h > cd /work && \
    python train.py --model $MODEL --out $OUT
@train > tail -f log.txt &
@train > cat > run.sh <<'EOF'
echo $MODEL
EOF
wait @train "step \d+ done" timeout=4h poll=1m
wait @train file=$OUT/done timeout=30m
wait @gpu port=8888
wait @train idle timeout=10
@gpu:$OUT -> @r2:runs/$MODEL
notify "Training of $MODEL done" level=success
tmux.close @train
"#;

    fn steps(src: &str) -> Vec<StepKind> {
        parse_recipe("t", src).unwrap().steps.into_iter().map(|s| s.kind).collect()
    }

    #[test]
    fn parses_sample() {
        let r = parse_recipe("ft", SAMPLE).unwrap();
        assert_eq!(r.variables["OUT"], "/ckpt/llama-7b");
        assert_eq!(r.hosts["gpu"], "root@1.2.3.4 -p 2222");
        assert_eq!(r.storages["r2"], "r2:bucket");
        assert_eq!(r.steps.len(), 12);

        let StepKind::Execute(e) = &r.steps[2].kind else {
            panic!("expected execute");
        };
        assert_eq!(e.command, "cd /work && python train.py --model llama-7b --out /ckpt/llama-7b");
        assert_eq!(e.timeout_secs, 7200);
        assert_eq!(r.steps[2].line, 9);

        let StepKind::Execute(bg) = &r.steps[3].kind else {
            panic!("expected execute");
        };
        assert!(bg.background);
        assert_eq!(bg.command, "tail -f log.txt");

        let StepKind::Execute(here) = &r.steps[4].kind else {
            panic!("expected execute");
        };
        assert_eq!(here.command, "cat > run.sh <<'EOF'\necho llama-7b\nEOF");
        assert_eq!(r.steps[5].line, 15);
    }

    #[test]
    fn parses_wait_forms() {
        let r = parse_recipe("ft", SAMPLE).unwrap();
        let waits: Vec<&WaitStep> = r
            .steps
            .iter()
            .filter_map(|s| match &s.kind {
                StepKind::Wait(w) => Some(w),
                _ => None,
            })
            .collect();
        assert_eq!(waits[0].condition, WaitCondition::Pattern);
        assert_eq!(waits[0].pattern.as_deref(), Some(r"step \d+ done"));
        assert_eq!(waits[0].timeout_secs, Some(4 * 3600));
        assert_eq!(waits[0].poll_secs, Some(60));
        assert_eq!(waits[1].condition, WaitCondition::File("/ckpt/llama-7b/done".into()));
        assert_eq!(waits[2].condition, WaitCondition::Port(8888));
        assert_eq!(waits[2].timeout_secs, None);
        assert_eq!(waits[3].condition, WaitCondition::Idle);
        assert_eq!(waits[3].timeout_secs, Some(10));
    }

    #[test]
    fn control_args_are_kept_raw() {
        let kinds = steps("notify \"done $X\" level=success\nsleep 5m\n");
        assert_eq!(
            kinds[0],
            StepKind::Control(ControlStep {
                command: ControlCommand::Notify,
                args: vec!["done $X".into(), "level=success".into()],
            })
        );
        assert_eq!(
            kinds[1],
            StepKind::Control(ControlStep {
                command: ControlCommand::Sleep,
                args: vec!["5m".into()],
            })
        );
    }

    #[test]
    fn interpolation_uses_only_earlier_variables() {
        let r = parse_recipe("t", "host h = $USER@box\nvar USER = me\n@h > echo ${USER} ${secret:tok} $HOME\n").unwrap();
        assert_eq!(r.hosts["h"], "$USER@box");
        let StepKind::Execute(e) = &r.steps[0].kind else {
            panic!("expected execute");
        };
        assert_eq!(e.command, "echo me ${secret:tok} $HOME");
    }

    #[test]
    fn rejects_duplicate_names_across_namespaces() {
        let err = parse_recipe("t", "var X = 1\nhost X = foo\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("duplicate"));
        assert!(parse_recipe("t", "storage s = /a\nvar s = 2\n").is_err());
        assert!(parse_recipe("t", "host h = a\nhost h = b\n").is_err());
    }

    #[test]
    fn reports_line_of_bad_input() {
        let err = parse_recipe("t", "var A = 1\n\nfrobnicate @x\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.text, "frobnicate @x");
        assert!(err.to_string().starts_with("line 3: unknown command"));

        assert!(parse_recipe("t", "wait @w\n").is_err());
        assert!(parse_recipe("t", "wait @w \"(\"\n").is_err());
        assert!(parse_recipe("t", "@w timeout=soon > ls\n").is_err());
        assert!(parse_recipe("t", "@w > cat <<EOF\nno end\n").is_err());
        assert!(parse_recipe("t", "@w > \n").is_err());
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("30s"), Ok(30));
        assert_eq!(parse_duration("5m"), Ok(300));
        assert_eq!(parse_duration("2h"), Ok(7200));
        assert_eq!(parse_duration("45"), Ok(45));
        assert!(parse_duration("1d").is_err());
        assert!(parse_duration("").is_err());
        assert_eq!(format_duration(7200), "2h");
        assert_eq!(format_duration(90), "90s");
        assert_eq!(format_duration(0), "0s");
    }

    #[test]
    fn render_then_parse_keeps_steps() {
        let first = parse_recipe("ft", SAMPLE).unwrap();
        let rendered = render_recipe(&first);
        let second = parse_recipe("ft", &rendered).unwrap();
        assert_eq!(second.variables, first.variables);
        assert_eq!(second.hosts, first.hosts);
        assert_eq!(second.storages, first.storages);
        let a: Vec<&StepKind> = first.steps.iter().map(|s| &s.kind).collect();
        let b: Vec<&StepKind> = second.steps.iter().map(|s| &s.kind).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn render_keeps_late_variables_unresolved() {
        let src = "host h = $USER@box\nvar USER = me\n@h > echo $X ${USER}\nvar X = 1\nvar Y = $Z-$X\nvar Z = z\n";
        let first = parse_recipe("late", src).unwrap();
        assert_eq!(first.hosts["h"], "$USER@box");
        assert_eq!(first.variables["Y"], "$Z-1");

        let second = parse_recipe("late", &render_recipe(&first)).unwrap();
        assert_eq!(second.hosts, first.hosts);
        assert_eq!(second.variables, first.variables);
        assert_eq!(second.steps[0].kind, first.steps[0].kind);
        match &second.steps[0].kind {
            StepKind::Execute(e) => assert_eq!(e.command, "echo $X me"),
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn here_strings_are_single_line() {
        let r = parse_recipe("t", "@w > cat <<<\"hello\"\nsleep 1s\n").unwrap();
        assert_eq!(r.steps.len(), 2);
        match &r.steps[0].kind {
            StepKind::Execute(e) => assert_eq!(e.command, "cat <<<\"hello\""),
            other => panic!("unexpected step {other:?}"),
        }
        let r = parse_recipe("t", "@w > cat<<EOF\nhi\nEOF\n").unwrap();
        assert_eq!(r.steps.len(), 1);
    }

    #[test]
    fn wait_rejects_mixed_conditions() {
        for line in [
            "wait @w file=/x port=8080",
            "wait @w idle file=/x",
            "wait @w port=22 idle",
            "wait @w \"done\" idle",
            "wait @w ready file=/x",
        ] {
            let err = parse_recipe("t", &format!("sleep 1s\n{line}\n")).unwrap_err();
            assert_eq!(err.line, 2, "{line}");
        }
    }
}
