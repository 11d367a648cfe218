//! `and`/`or` expression grammar: a disjunction of conjunctions of atomic
//! rules. No parentheses; `and` binds tighter than `or` (§4.3, §9 open
//! question: nested grouping is a grammar extension, not inferred here).

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicRule {
    pub name: String,
    pub args: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conjunction {
    pub rules: Vec<AtomicRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub disjunction: Vec<Conjunction>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("malformed tag expression: {0}")]
pub struct ParseError(pub String);

/// Tokenizes on whitespace. `and`/`or` are literal, case-sensitive keywords;
/// anything else is the start of an atomic rule (`name arg1 arg2 …`), which
/// continues until the next `and`/`or` token.
pub fn parse(expr: &str) -> Result<Expression, ParseError> {
    let tokens: Vec<&str> = expr.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(ParseError("empty expression".to_string()));
    }

    let mut disjunction = Vec::new();
    let mut current_conjunction = Vec::new();
    let mut current_rule: Option<(String, Vec<String>)> = None;

    let flush_rule = |current_rule: &mut Option<(String, Vec<String>)>,
                       current_conjunction: &mut Vec<AtomicRule>|
     -> Result<(), ParseError> {
        if let Some((name, args)) = current_rule.take() {
            current_conjunction.push(AtomicRule {
                name,
                args: args.join(" "),
            });
        }
        Ok(())
    };

    for tok in tokens {
        match tok {
            "and" => {
                flush_rule(&mut current_rule, &mut current_conjunction)?;
                if current_conjunction.is_empty() {
                    return Err(ParseError("'and' with no preceding rule".to_string()));
                }
            }
            "or" => {
                flush_rule(&mut current_rule, &mut current_conjunction)?;
                if current_conjunction.is_empty() {
                    return Err(ParseError("'or' with no preceding rule".to_string()));
                }
                disjunction.push(Conjunction {
                    rules: std::mem::take(&mut current_conjunction),
                });
            }
            other => match &mut current_rule {
                Some((_, args)) => args.push(other.to_string()),
                None => current_rule = Some((other.to_string(), Vec::new())),
            },
        }
    }
    flush_rule(&mut current_rule, &mut current_conjunction)?;
    if current_conjunction.is_empty() {
        return Err(ParseError("trailing 'and'/'or' with no rule".to_string()));
    }
    disjunction.push(Conjunction {
        rules: current_conjunction,
    });

    Ok(Expression { disjunction })
}
