//! Generator function families and the catalog of their parameter sets.

mod assign;

pub use assign::{assign_functions, SensorFunction};

use crate::error::BenchError;
use serde::Deserialize;
use std::f64::consts::TAU;
use std::fmt;
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("../resources/functions.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionFamily {
    Line,
    Sin,
    Square,
    Random,
    Constant,
}

impl fmt::Display for FunctionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Line => "LINE",
            Self::Sin => "SIN",
            Self::Square => "SQUARE",
            Self::Random => "RANDOM",
            Self::Constant => "CONSTANT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LineParams {
    pub slope: f64,
    pub intercept: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SinParams {
    pub amplitude: f64,
    pub period: f64,
    pub phase: f64,
    pub offset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SquareParams {
    pub high: f64,
    pub low: f64,
    pub period: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RandomParams {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ConstantParams {
    pub value: f64,
}

/// Parameters of one generator function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FunctionParam {
    Line(LineParams),
    Sin(SinParams),
    Square(SquareParams),
    Random(RandomParams),
    Constant(ConstantParams),
}

impl FunctionParam {
    pub fn family(&self) -> FunctionFamily {
        match self {
            Self::Line(_) => FunctionFamily::Line,
            Self::Sin(_) => FunctionFamily::Sin,
            Self::Square(_) => FunctionFamily::Square,
            Self::Random(_) => FunctionFamily::Random,
            Self::Constant(_) => FunctionFamily::Constant,
        }
    }

    /// Deterministic part of the function at `t`. `uniform` is a draw in `[0, 1)`
    /// and is only used by the random family.
    pub fn evaluate(&self, t: i64, uniform: f64) -> f64 {
        let t = t as f64;
        match self {
            Self::Line(p) => p.slope * t + p.intercept,
            Self::Sin(p) => p.amplitude * (TAU * t / p.period + p.phase).sin() + p.offset,
            Self::Square(p) => {
                if t.rem_euclid(p.period) < p.period / 2.0 {
                    p.high
                } else {
                    p.low
                }
            }
            Self::Random(p) => p.min + (p.max - p.min) * uniform,
            Self::Constant(p) => p.value,
        }
    }

    fn validate(&self, id: &str) -> Result<(), BenchError> {
        let bad = |reason: &str| Err(BenchError::config(format!("function {id}: {reason}")));
        match self {
            Self::Sin(p) if !(p.period > 0.0) => bad("sin period must be positive"),
            Self::Square(p) if !(p.period > 0.0) => bad("square period must be positive"),
            Self::Random(p) if p.min > p.max => bad("random min exceeds max"),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub id: String,
    pub param: FunctionParam,
}

#[derive(Debug, Deserialize)]
struct Named<P> {
    id: String,
    #[serde(flatten)]
    params: P,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CatalogFile {
    line: Vec<Named<LineParams>>,
    sin: Vec<Named<SinParams>>,
    square: Vec<Named<SquareParams>>,
    random: Vec<Named<RandomParams>>,
    constant: Vec<Named<ConstantParams>>,
}

/// Named parameter sets grouped by family, in file order.
#[derive(Debug, Clone, Default)]
pub struct FunctionCatalog {
    line: Vec<CatalogEntry>,
    sin: Vec<CatalogEntry>,
    square: Vec<CatalogEntry>,
    random: Vec<CatalogEntry>,
    constant: Vec<CatalogEntry>,
}

impl FunctionCatalog {
    pub fn builtin() -> Result<Self, BenchError> {
        Self::parse(BUILTIN_CATALOG)
    }

    pub fn from_path(path: &Path) -> Result<Self, BenchError> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            BenchError::config(format!(
                "failed to read function catalog {}: {err}",
                path.display()
            ))
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, BenchError> {
        let file: CatalogFile = toml::from_str(contents)
            .map_err(|err| BenchError::config(format!("invalid function catalog: {err}")))?;

        fn entries<P>(
            items: Vec<Named<P>>,
            wrap: fn(P) -> FunctionParam,
        ) -> Result<Vec<CatalogEntry>, BenchError> {
            items
                .into_iter()
                .map(|item| {
                    let entry = CatalogEntry {
                        param: wrap(item.params),
                        id: item.id,
                    };
                    entry.param.validate(&entry.id)?;
                    Ok(entry)
                })
                .collect()
        }

        Ok(Self {
            line: entries(file.line, FunctionParam::Line)?,
            sin: entries(file.sin, FunctionParam::Sin)?,
            square: entries(file.square, FunctionParam::Square)?,
            random: entries(file.random, FunctionParam::Random)?,
            constant: entries(file.constant, FunctionParam::Constant)?,
        })
    }

    pub fn family(&self, family: FunctionFamily) -> &[CatalogEntry] {
        match family {
            FunctionFamily::Line => &self.line,
            FunctionFamily::Sin => &self.sin,
            FunctionFamily::Square => &self.square,
            FunctionFamily::Random => &self.random,
            FunctionFamily::Constant => &self.constant,
        }
    }
}
