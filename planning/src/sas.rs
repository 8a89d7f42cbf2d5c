//! Reader and writer for the preprocessed SAS⁺ file format.
//!
//! The format is line oriented: literal delimiters (`begin_version`, ...),
//! zero-based variable and value indices, and `var value` pairs for goal and
//! mutex entries. Version 3 is the only accepted version. Tasks with axioms
//! or conditional effects are rejected up front.

use crate::task::{Fact, Operator, PrePost, State, Task, VarId, Variable};
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;

const SAS_VERSION: i32 = 3;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("unsupported SAS version {0}, expected {SAS_VERSION}")]
    UnsupportedVersion(i32),
    #[error("line {line}: expected `{expected}`, got `{found}`")]
    UnexpectedToken {
        line: usize,
        expected: String,
        found: String,
    },
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("axioms are not supported")]
    AxiomsUnsupported,
    #[error("conditional effects are not supported")]
    ConditionalEffectsUnsupported,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

struct LineReader<'a> {
    lines: std::str::Lines<'a>,
    line_number: usize,
}

impl<'a> LineReader<'a> {
    fn new(text: &'a str) -> Self {
        LineReader {
            lines: text.lines(),
            line_number: 0,
        }
    }

    fn next_line(&mut self) -> Result<&'a str, InputError> {
        self.line_number += 1;
        self.lines.next().ok_or(InputError::Malformed {
            line: self.line_number,
            message: "unexpected end of file".to_string(),
        })
    }

    fn expect(&mut self, token: &str) -> Result<(), InputError> {
        let line = self.next_line()?;
        if line.trim() == token {
            Ok(())
        } else {
            Err(InputError::UnexpectedToken {
                line: self.line_number,
                expected: token.to_string(),
                found: line.to_string(),
            })
        }
    }

    fn read_int(&mut self) -> Result<i32, InputError> {
        let line = self.next_line()?;
        self.parse_int(line)
    }

    fn parse_int(&self, token: &str) -> Result<i32, InputError> {
        token.trim().parse().map_err(|_| InputError::Malformed {
            line: self.line_number,
            message: format!("expected an integer, got `{token}`"),
        })
    }

    fn read_int_pair(&mut self) -> Result<(i32, i32), InputError> {
        let line = self.next_line()?;
        let mut parts = line.split_whitespace();
        let a = parts.next().unwrap_or("");
        let b = parts.next().unwrap_or("");
        if parts.next().is_some() || b.is_empty() {
            return Err(InputError::Malformed {
                line: self.line_number,
                message: format!("expected `var value`, got `{line}`"),
            });
        }
        Ok((self.parse_int(a)?, self.parse_int(b)?))
    }

    fn malformed(&self, message: impl Into<String>) -> InputError {
        InputError::Malformed {
            line: self.line_number,
            message: message.into(),
        }
    }
}

pub fn load_task(path: impl AsRef<Path>) -> Result<Task, InputError> {
    let text = std::fs::read_to_string(path)?;
    read_task(&text)
}

pub fn read_task(text: &str) -> Result<Task, InputError> {
    let mut reader = LineReader::new(text);

    reader.expect("begin_version")?;
    let version = reader.read_int()?;
    if version != SAS_VERSION {
        return Err(InputError::UnsupportedVersion(version));
    }
    reader.expect("end_version")?;

    reader.expect("begin_metric")?;
    let metric = match reader.read_int()? {
        0 => false,
        1 => true,
        other => return Err(reader.malformed(format!("metric must be 0 or 1, got {other}"))),
    };
    reader.expect("end_metric")?;

    let num_variables = reader.read_int()?;
    let mut variables = Vec::with_capacity(num_variables.max(0) as usize);
    for _ in 0..num_variables {
        variables.push(read_variable(&mut reader)?);
    }

    let check_fact = |reader: &LineReader, var: i32, value: i32| -> Result<Fact, InputError> {
        let variable: &Variable = variables
            .get(var.max(0) as usize)
            .filter(|_| var >= 0)
            .ok_or_else(|| reader.malformed(format!("variable index {var} out of range")))?;
        if value < 0 || value >= variable.domain_size() {
            return Err(reader.malformed(format!("value {value} out of range for variable {var}")));
        }
        Ok(Fact::new(VarId::from(var as u32), value))
    };

    let num_mutexes = reader.read_int()?;
    let mut mutexes = Vec::with_capacity(num_mutexes.max(0) as usize);
    for _ in 0..num_mutexes {
        reader.expect("begin_mutex_group")?;
        let num_facts = reader.read_int()?;
        let mut group = Vec::with_capacity(num_facts.max(0) as usize);
        for _ in 0..num_facts {
            let (var, value) = reader.read_int_pair()?;
            group.push(check_fact(&reader, var, value)?);
        }
        reader.expect("end_mutex_group")?;
        mutexes.push(group);
    }

    reader.expect("begin_state")?;
    let mut initial_values = Vec::with_capacity(variables.len());
    for var in 0..variables.len() {
        let value = reader.read_int()?;
        check_fact(&reader, var as i32, value)?;
        initial_values.push(value);
    }
    reader.expect("end_state")?;

    reader.expect("begin_goal")?;
    let num_goals = reader.read_int()?;
    let mut goals = Vec::with_capacity(num_goals.max(0) as usize);
    for _ in 0..num_goals {
        let (var, value) = reader.read_int_pair()?;
        goals.push(check_fact(&reader, var, value)?);
    }
    reader.expect("end_goal")?;
    goals.sort();
    if goals.windows(2).any(|w| w[0].var == w[1].var) {
        return Err(reader.malformed("two goal facts on the same variable"));
    }

    let num_operators = reader.read_int()?;
    let mut operators = Vec::with_capacity(num_operators.max(0) as usize);
    for _ in 0..num_operators {
        operators.push(read_operator(&mut reader, metric, &check_fact)?);
    }

    let num_axioms = reader.read_int()?;
    if num_axioms > 0 {
        return Err(InputError::AxiomsUnsupported);
    }

    let mut task = Task::new(variables, operators, State::new(initial_values), goals);
    task.mutexes = mutexes;
    task.metric = metric;
    Ok(task)
}

fn read_variable(reader: &mut LineReader) -> Result<Variable, InputError> {
    reader.expect("begin_variable")?;
    let name = reader.next_line()?.to_string();
    let axiom_layer = reader.read_int()?;
    if axiom_layer != -1 {
        return Err(InputError::AxiomsUnsupported);
    }
    let domain_size = reader.read_int()?;
    if domain_size < 1 {
        return Err(reader.malformed(format!("domain size must be positive, got {domain_size}")));
    }
    let mut fact_names = Vec::with_capacity(domain_size as usize);
    for _ in 0..domain_size {
        fact_names.push(reader.next_line()?.to_string());
    }
    reader.expect("end_variable")?;
    Ok(Variable {
        name,
        axiom_layer,
        fact_names,
    })
}

fn read_operator<'a>(
    reader: &mut LineReader<'a>,
    metric: bool,
    check_fact: &impl Fn(&LineReader<'a>, i32, i32) -> Result<Fact, InputError>,
) -> Result<Operator, InputError> {
    reader.expect("begin_operator")?;
    let name = reader.next_line()?.to_string();

    let num_prevail = reader.read_int()?;
    let mut prevail = Vec::with_capacity(num_prevail.max(0) as usize);
    for _ in 0..num_prevail {
        let (var, value) = reader.read_int_pair()?;
        prevail.push(check_fact(reader, var, value)?);
    }

    let num_effects = reader.read_int()?;
    let mut pre_post = Vec::with_capacity(num_effects.max(0) as usize);
    for _ in 0..num_effects {
        let line = reader.next_line()?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let num_conditions = reader.parse_int(fields.first().copied().unwrap_or(""))?;
        if num_conditions != 0 {
            return Err(InputError::ConditionalEffectsUnsupported);
        }
        if fields.len() != 4 {
            return Err(reader.malformed(format!("expected `0 var pre post`, got `{line}`")));
        }
        let var = reader.parse_int(fields[1])?;
        let pre = reader.parse_int(fields[2])?;
        let post = reader.parse_int(fields[3])?;
        let eff = check_fact(reader, var, post)?;
        let pre = if pre == -1 {
            None
        } else {
            Some(check_fact(reader, var, pre)?.value)
        };
        pre_post.push(PrePost {
            var: eff.var,
            pre,
            post: eff.value,
        });
    }

    let cost_line = reader.read_int()?;
    if cost_line < 0 {
        return Err(reader.malformed(format!("negative operator cost {cost_line}")));
    }
    let cost = if metric { cost_line } else { 1 };
    reader.expect("end_operator")?;
    Ok(Operator::new(name, prevail, pre_post, cost))
}

pub fn write_task(task: &Task) -> String {
    let mut out = String::new();
    writeln!(out, "begin_version\n{SAS_VERSION}\nend_version").unwrap();
    writeln!(out, "begin_metric\n{}\nend_metric", task.metric as i32).unwrap();

    writeln!(out, "{}", task.num_variables()).unwrap();
    for variable in task.variables.values() {
        writeln!(out, "begin_variable").unwrap();
        writeln!(out, "{}", variable.name).unwrap();
        writeln!(out, "{}", variable.axiom_layer).unwrap();
        writeln!(out, "{}", variable.domain_size()).unwrap();
        for fact_name in &variable.fact_names {
            writeln!(out, "{fact_name}").unwrap();
        }
        writeln!(out, "end_variable").unwrap();
    }

    writeln!(out, "{}", task.mutexes.len()).unwrap();
    for group in &task.mutexes {
        writeln!(out, "begin_mutex_group").unwrap();
        writeln!(out, "{}", group.len()).unwrap();
        for fact in group {
            writeln!(out, "{} {}", fact.var, fact.value).unwrap();
        }
        writeln!(out, "end_mutex_group").unwrap();
    }

    writeln!(out, "begin_state").unwrap();
    for fact in task.initial_state.facts() {
        writeln!(out, "{}", fact.value).unwrap();
    }
    writeln!(out, "end_state").unwrap();

    writeln!(out, "begin_goal").unwrap();
    writeln!(out, "{}", task.goals.len()).unwrap();
    for fact in &task.goals {
        writeln!(out, "{} {}", fact.var, fact.value).unwrap();
    }
    writeln!(out, "end_goal").unwrap();

    writeln!(out, "{}", task.num_operators()).unwrap();
    for op in task.operators.values() {
        writeln!(out, "begin_operator").unwrap();
        writeln!(out, "{}", op.name).unwrap();
        writeln!(out, "{}", op.prevail.len()).unwrap();
        for fact in &op.prevail {
            writeln!(out, "{} {}", fact.var, fact.value).unwrap();
        }
        writeln!(out, "{}", op.pre_post.len()).unwrap();
        for pp in &op.pre_post {
            writeln!(out, "0 {} {} {}", pp.var, pp.pre.unwrap_or(-1), pp.post).unwrap();
        }
        writeln!(out, "{}", op.cost).unwrap();
        writeln!(out, "end_operator").unwrap();
    }

    // Axiom section is always empty: tasks with axioms are rejected on input.
    writeln!(out, "0").unwrap();
    out
}

#[cfg(test)]
mod test {
    use super::*;

    const SINGLETON: &str = "\
begin_version
3
end_version
begin_metric
1
end_metric
1
begin_variable
var0
-1
2
Atom at(a)
Atom at(b)
end_variable
0
begin_state
0
end_state
begin_goal
1
0 1
end_goal
1
begin_operator
go a b
0
1
0 0 0 1
1
end_operator
0
";

    #[test]
    fn test_read_singleton_task() {
        let task = read_task(SINGLETON).unwrap();
        assert_eq!(task.num_variables(), 1);
        assert_eq!(task.num_operators(), 1);
        assert!(task.metric);
        let op = &task.operators[crate::task::OpId::from(0usize)];
        assert_eq!(op.cost, 1);
        assert_eq!(op.preconditions().len(), 1);
        assert_eq!(op.effects().len(), 1);
        assert_eq!(task.goals, vec![Fact::new(VarId::from(0usize), 1)]);
    }

    #[test]
    fn test_round_trip() {
        let task = read_task(SINGLETON).unwrap();
        let dumped = write_task(&task);
        let reparsed = read_task(&dumped).unwrap();
        assert_eq!(task, reparsed);
        assert_eq!(dumped, write_task(&reparsed));
    }

    #[test]
    fn test_bad_version() {
        let text = SINGLETON.replace("begin_version\n3", "begin_version\n2");
        match read_task(&text) {
            Err(InputError::UnsupportedVersion(2)) => {}
            other => panic!("expected version error, got {other:?}"),
        }
    }

    #[test]
    fn test_conditional_effects_rejected() {
        let text = SINGLETON.replace("0 0 0 1", "1 0 0 0 0 1");
        assert!(matches!(
            read_task(&text),
            Err(InputError::ConditionalEffectsUnsupported)
        ));
    }

    #[test]
    fn test_axioms_rejected() {
        let text = SINGLETON.trim_end().trim_end_matches('0').to_string() + "1\n";
        assert!(matches!(read_task(&text), Err(InputError::AxiomsUnsupported)));
    }

    #[test]
    fn test_unit_cost_metric() {
        let text = SINGLETON
            .replace("begin_metric\n1", "begin_metric\n0")
            .replace("0 0 0 1\n1", "0 0 0 1\n7");
        let task = read_task(&text).unwrap();
        assert_eq!(task.operators[crate::task::OpId::from(0usize)].cost, 1);
    }

    #[test]
    fn test_goal_value_out_of_range() {
        let text = SINGLETON.replace("0 1\nend_goal", "0 5\nend_goal");
        assert!(matches!(read_task(&text), Err(InputError::Malformed { .. })));
    }
}
