//! Tree-walking evaluation over a whitelisted set of names.

use super::parser::{BinaryOp, Expr};
use super::value::{Matrix, Value};
use super::{EvalError, EvalResult};
use std::collections::BTreeMap;
use std::f64::consts::{E, PI};

/// Names resolvable without assignment.
pub const CONSTANTS: &[(&str, f64)] = &[("pi", PI), ("e", E)];

pub const FUNCTIONS: &[&str] = &[
    "abs", "round", "pow", "min", "max", "sin", "cos", "tan", "asin", "acos", "atan", "log",
    "log10", "exp", "sqrt", "degrees", "radians", "factorial", "ceil", "floor", "sum", "mean",
    "std", "size",
];

pub fn eval(expr: &Expr, vars: &BTreeMap<String, Value>) -> EvalResult<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Var(name) => lookup(name, vars),
        Expr::Neg(inner) => Ok(match eval(inner, vars)? {
            Value::Number(n) => Value::Number(-n),
            Value::Matrix(m) => Value::Matrix(m.map(|x| -x)),
        }),
        Expr::Transpose(inner) => Ok(match eval(inner, vars)? {
            Value::Matrix(m) => Value::Matrix(m.transpose()),
            number => number,
        }),
        Expr::Binary(op, lhs, rhs) => binary(*op, eval(lhs, vars)?, eval(rhs, vars)?),
        Expr::Chain(first, rest) => rest
            .iter()
            .try_fold(eval(first, vars)?, |acc, (op, rhs)| {
                binary(*op, acc, eval(rhs, vars)?)
            }),
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|a| eval(a, vars))
                .collect::<EvalResult<Vec<_>>>()?;
            call(name, args)
        }
        Expr::Matrix(rows) => {
            let rows = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|e| eval(e, vars)?.as_number("matrix element"))
                        .collect::<EvalResult<Vec<f64>>>()
                })
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Value::Matrix(Matrix::from_rows(rows)?))
        }
    }
}

fn lookup(name: &str, vars: &BTreeMap<String, Value>) -> EvalResult<Value> {
    if let Some(value) = vars.get(name) {
        return Ok(value.clone());
    }
    CONSTANTS
        .iter()
        .find(|(constant, _)| *constant == name)
        .map(|(_, v)| Value::Number(*v))
        .ok_or_else(|| EvalError::UnknownName(name.to_string()))
}

/// Halves go to the even neighbour. A scale too small or too large to matter
/// leaves `x` unchanged, or rounds it to zero for very negative `digits`.
fn round_to(x: f64, digits: f64) -> EvalResult<f64> {
    if !x.is_finite() {
        return Ok(x);
    }
    // Beyond 10^±400 every finite f64 is either unaffected or zeroed.
    let exponent = digits.abs().min(400.0) as i32;
    let scale = 10f64.powi(exponent);

    if digits >= 0.0 {
        let scaled = x * scale;
        if !scale.is_finite() || !scaled.is_finite() {
            return Ok(x);
        }
        return Ok(scaled.round_ties_even() / scale);
    }

    if !scale.is_finite() {
        return Ok(0.0 * x.signum());
    }
    let rounded = (x / scale).round_ties_even() * scale;
    if rounded.is_finite() {
        Ok(rounded)
    } else {
        Err(domain("round", "rounded value too large to represent"))
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> EvalResult<Value> {
    use Value::{Matrix as M, Number as N};

    match (op, lhs, rhs) {
        (_, N(a), N(b)) => scalar(op, a, b).map(N),

        (BinaryOp::Add, M(a), M(b)) => a.zip_with(&b, |x, y| x + y).map(M),
        (BinaryOp::Sub, M(a), M(b)) => a.zip_with(&b, |x, y| x - y).map(M),
        (BinaryOp::Mul, M(a), M(b)) => a.matmul(&b).map(M),

        (BinaryOp::Add, M(a), N(b)) | (BinaryOp::Add, N(b), M(a)) => Ok(M(a.map(|x| x + b))),
        (BinaryOp::Mul, M(a), N(b)) | (BinaryOp::Mul, N(b), M(a)) => Ok(M(a.map(|x| x * b))),
        (BinaryOp::Sub, M(a), N(b)) => Ok(M(a.map(|x| x - b))),
        (BinaryOp::Sub, N(a), M(b)) => Ok(M(b.map(|x| a - x))),
        (BinaryOp::Div, M(a), N(b)) => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(M(a.map(|x| x / b)))
        }

        (op, lhs, rhs) => Err(EvalError::Type {
            message: format!(
                "unsupported operand types for {:?}: {} and {}",
                op,
                lhs.type_name(),
                rhs.type_name()
            ),
        }),
    }
}

fn scalar(op: BinaryOp, a: f64, b: f64) -> EvalResult<f64> {
    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Sub => Ok(a - b),
        BinaryOp::Mul => Ok(a * b),
        BinaryOp::Div => {
            if b == 0.0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(a / b)
            }
        }
        // Result takes the sign of the divisor.
        BinaryOp::Mod => {
            if b == 0.0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(((a % b) + b) % b)
            }
        }
        BinaryOp::Pow => power(a, b),
    }
}

fn power(base: f64, exponent: f64) -> EvalResult<f64> {
    if base == 0.0 && exponent < 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    let result = base.powf(exponent);
    if result.is_nan() {
        return Err(EvalError::Domain {
            function: "pow".to_string(),
            message: format!("{} ** {} has no real result", base, exponent),
        });
    }
    if result.is_infinite() && base.is_finite() && exponent.is_finite() {
        return Err(EvalError::Domain {
            function: "pow".to_string(),
            message: "result too large".to_string(),
        });
    }
    Ok(result)
}

fn domain(function: &str, message: impl Into<String>) -> EvalError {
    EvalError::Domain {
        function: function.to_string(),
        message: message.into(),
    }
}

fn arity(function: &str, expected: &'static str, got: usize) -> EvalResult<()> {
    let ok = match expected {
        "1" => got == 1,
        "2" => got == 2,
        "1 or 2" => got == 1 || got == 2,
        _ => got >= 1,
    };
    if ok {
        Ok(())
    } else {
        Err(EvalError::Arity {
            function: function.to_string(),
            expected,
            got,
        })
    }
}

/// Applies `f` to a scalar, or to every element of a matrix.
fn elementwise(value: Value, f: impl Fn(f64) -> EvalResult<f64>) -> EvalResult<Value> {
    match value {
        Value::Number(n) => f(n).map(Value::Number),
        Value::Matrix(m) => {
            let rows = (0..m.rows())
                .map(|i| (0..m.cols()).map(|j| f(m.get(i, j))).collect::<EvalResult<Vec<f64>>>())
                .collect::<EvalResult<Vec<Vec<f64>>>>()?;
            Matrix::from_rows(rows).map(Value::Matrix)
        }
    }
}

fn elements(value: &Value) -> Vec<f64> {
    match value {
        Value::Number(n) => vec![*n],
        Value::Matrix(m) => m.values().to_vec(),
    }
}

fn call(name: &str, mut args: Vec<Value>) -> EvalResult<Value> {
    match name {
        "min" | "max" => {
            arity(name, "at least 1", args.len())?;
            let values: Vec<f64> = if args.len() == 1 {
                elements(&args[0])
            } else {
                args.iter()
                    .map(|a| a.as_number(name))
                    .collect::<EvalResult<_>>()?
            };
            let pick = if name == "min" { f64::min } else { f64::max };
            values
                .into_iter()
                .reduce(pick)
                .map(Value::Number)
                .ok_or_else(|| domain(name, "arg is an empty sequence"))
        }
        "pow" => {
            arity(name, "2", args.len())?;
            let exponent = args[1].as_number(name)?;
            let base = args[0].as_number(name)?;
            power(base, exponent).map(Value::Number)
        }
        "round" => {
            arity(name, "1 or 2", args.len())?;
            let digits = match args.get(1) {
                Some(d) => d.as_number(name)?,
                None => 0.0,
            };
            if digits.fract() != 0.0 {
                return Err(EvalError::Type {
                    message: "round() digits must be an integer".to_string(),
                });
            }
            elementwise(args.swap_remove(0), |x| round_to(x, digits))
        }
        "log" => {
            arity(name, "1 or 2", args.len())?;
            let base = match args.get(1) {
                Some(b) => Some(b.as_number(name)?),
                None => None,
            };
            if let Some(b) = base {
                if b <= 0.0 || b == 1.0 {
                    return Err(domain(name, "math domain error"));
                }
            }
            elementwise(args.swap_remove(0), |x| {
                if x <= 0.0 {
                    return Err(domain(name, "math domain error"));
                }
                Ok(match base {
                    Some(b) => x.ln() / b.ln(),
                    None => x.ln(),
                })
            })
        }
        "sum" | "mean" | "std" => {
            arity(name, "1", args.len())?;
            let values = elements(&args[0]);
            if values.is_empty() {
                return match name {
                    "sum" => Ok(Value::Number(0.0)),
                    _ => Err(domain(name, "empty matrix")),
                };
            }
            let count = values.len() as f64;
            let total: f64 = values.iter().sum();
            let mean = total / count;
            Ok(Value::Number(match name {
                "sum" => total,
                "mean" => mean,
                _ => (values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / count).sqrt(),
            }))
        }
        "size" => {
            arity(name, "1", args.len())?;
            let (rows, cols) = args[0].size();
            Matrix::from_rows(vec![vec![rows as f64, cols as f64]]).map(Value::Matrix)
        }
        _ => {
            if !FUNCTIONS.contains(&name) {
                return Err(EvalError::UnknownFunction(name.to_string()));
            }
            arity(name, "1", args.len())?;
            elementwise(args.swap_remove(0), |x| unary(name, x))
        }
    }
}

fn unary(name: &str, x: f64) -> EvalResult<f64> {
    match name {
        "abs" => Ok(x.abs()),
        "sin" => Ok(x.sin()),
        "cos" => Ok(x.cos()),
        "tan" => Ok(x.tan()),
        "atan" => Ok(x.atan()),
        "degrees" => Ok(x.to_degrees()),
        "radians" => Ok(x.to_radians()),
        "ceil" => Ok(x.ceil()),
        "floor" => Ok(x.floor()),
        "exp" => {
            let y = x.exp();
            if y.is_infinite() && x.is_finite() {
                Err(domain(name, "math range error"))
            } else {
                Ok(y)
            }
        }
        "asin" | "acos" if !(-1.0..=1.0).contains(&x) => Err(domain(name, "math domain error")),
        "asin" => Ok(x.asin()),
        "acos" => Ok(x.acos()),
        "sqrt" if x < 0.0 => Err(domain(name, "math domain error")),
        "sqrt" => Ok(x.sqrt()),
        "log10" if x <= 0.0 => Err(domain(name, "math domain error")),
        "log10" => Ok(x.log10()),
        "factorial" if x < 0.0 || x.fract() != 0.0 => Err(domain(
            name,
            "only accepts non-negative integral values",
        )),
        "factorial" if x > 170.0 => Err(domain(name, "result too large")),
        "factorial" => Ok((1..=x as u32).map(f64::from).product()),
        other => Err(EvalError::UnknownFunction(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::super::parser::{parse_statement, Statement};
    use super::*;

    fn run(input: &str) -> EvalResult<Value> {
        let statement = parse_statement(&tokenize(input)?)?;
        let Statement::Expr(expr) = statement else {
            panic!("expected expression");
        };
        eval(&expr, &BTreeMap::new())
    }

    fn number(input: &str) -> f64 {
        match run(input).unwrap() {
            Value::Number(n) => n,
            other => panic!("expected number, got {}", other),
        }
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(number("2 + 2"), 4.0);
        assert_eq!(number("12+21"), 33.0);
        assert_eq!(number("15/3"), 5.0);
        assert_eq!(number("2^8"), 256.0);
        assert_eq!(number("-2**2"), -4.0);
        assert_eq!(number("2**-1"), 0.5);
        assert_eq!(number("(1 + 2) * 3"), 9.0);
    }

    #[test]
    fn test_modulo_follows_divisor_sign() {
        assert_eq!(number("7 % 3"), 1.0);
        assert_eq!(number("-7 % 3"), 2.0);
        assert_eq!(number("7 % -3"), -2.0);
    }

    #[test]
    fn test_functions_and_constants() {
        assert_eq!(number("sqrt(16)"), 4.0);
        assert_eq!(number("max(1,2,3,4,5)"), 5.0);
        assert_eq!(number("min(3, -1)"), -1.0);
        assert_eq!(number("factorial(5)"), 120.0);
        assert_eq!(number("round(2.5)"), 2.0);
        assert_eq!(number("round(3.14159, 2)"), 3.14);
        assert_eq!(number("log(8, 2)"), 3.0);
        assert_eq!(number("sin(0)"), 0.0);
        assert!((number("degrees(pi)") - 180.0).abs() < 1e-9);
        assert!((number("log(e)") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_round_at_extreme_scales() {
        assert_eq!(number("round(3.14159, 400)"), 3.14159);
        assert_eq!(number("round(1e300, 10)"), 1e300);
        assert_eq!(number("round(1234.5, -2)"), 1200.0);
        assert_eq!(number("round(5, -400)"), 0.0);
        assert!(matches!(
            run("round(1.7e308, -308)"),
            Err(EvalError::Domain { .. })
        ));
    }

    #[test]
    fn test_long_operator_chain() {
        let input = format!("1+{}3", "2+".repeat(10000));
        assert_eq!(number(&input), 20004.0);
        assert_eq!(number("10 - 2 - 3 * 2 - 1"), 1.0);
        assert_eq!(
            run("[1 2; 3 4]'' * [1; 1] - 1").unwrap().to_string(),
            "[2; 6]"
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(run("1/0"), Err(EvalError::DivisionByZero)));
        assert!(matches!(run("5 % 0"), Err(EvalError::DivisionByZero)));
        assert!(matches!(run("sqrt(-1)"), Err(EvalError::Domain { .. })));
        assert!(matches!(run("log(0)"), Err(EvalError::Domain { .. })));
        assert!(matches!(run("asin(2)"), Err(EvalError::Domain { .. })));
        assert!(matches!(run("factorial(2.5)"), Err(EvalError::Domain { .. })));
        assert!(matches!(run("hgfdjhgf"), Err(EvalError::UnknownName(_))));
        assert!(matches!(run("system(1)"), Err(EvalError::UnknownFunction(_))));
        assert!(matches!(run("sqrt(1, 2)"), Err(EvalError::Arity { .. })));
        assert!(matches!(run("(-8) ** 0.5"), Err(EvalError::Domain { .. })));
    }

    #[test]
    fn test_matrix_operations() {
        assert_eq!(run("[1 2; 3 4] * [5; 6]").unwrap().to_string(), "[17; 39]");
        assert_eq!(run("[1 2] + [3 4]").unwrap().to_string(), "[4 6]");
        assert_eq!(run("2 * [1 -2]").unwrap().to_string(), "[2 -4]");
        assert_eq!(run("[1 2 3]'").unwrap().to_string(), "[1; 2; 3]");
        assert_eq!(run("[2 4] / 2").unwrap().to_string(), "[1 2]");
        assert_eq!(run("size([1 2 3; 4 5 6])").unwrap().to_string(), "[2 3]");
        assert_eq!(number("sum([1 2; 3 4])"), 10.0);
        assert_eq!(number("mean([1 2 3 4])"), 2.5);
        assert_eq!(number("std([2 4 4 4 5 5 7 9])"), 2.0);
        assert_eq!(number("max([3 9 1])"), 9.0);
        assert!(matches!(run("[1 2] + [1 2 3]"), Err(EvalError::Shape { .. })));
        assert!(matches!(run("[1 2] * [3 4]"), Err(EvalError::Shape { .. })));
        assert!(matches!(run("2 / [1 2]"), Err(EvalError::Type { .. })));
    }
}
