use crate::function::SensorFunction;
use crate::schema::DataType;
use crate::workload::mix_seed;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// A typed sensor value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Text(String),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Boolean(_) => DataType::Boolean,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::Text(_) => DataType::Text,
        }
    }

    /// Numeric view used by value filters; text has none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Int32(v) => Some(f64::from(*v)),
            Self::Int64(v) => Some(*v as f64),
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            Self::Text(_) => None,
        }
    }
}

/// Evaluates sensor functions into typed values.
///
/// Pure in `(sensor_index, t)`: the random family and text values draw from a
/// generator seeded by both, so the same point is reproduced on every call.
#[derive(Debug, Clone)]
pub struct DataPointGenerator {
    functions: Vec<SensorFunction>,
    data_types: Vec<DataType>,
    string_length: usize,
}

impl DataPointGenerator {
    pub fn new(
        functions: Vec<SensorFunction>,
        data_types: Vec<DataType>,
        string_length: usize,
    ) -> Self {
        debug_assert_eq!(functions.len(), data_types.len());
        Self {
            functions,
            data_types,
            string_length,
        }
    }

    pub fn sensor_count(&self) -> usize {
        self.functions.len()
    }

    fn point_rng(sensor_index: usize, t: i64) -> StdRng {
        StdRng::seed_from_u64(mix_seed(t as u64, sensor_index as u64))
    }

    /// Raw numeric value of `sensor_index` at `t`.
    pub fn numeric(&self, sensor_index: usize, t: i64) -> f64 {
        let function = &self.functions[sensor_index];
        let uniform = match function.param {
            crate::function::FunctionParam::Random(_) => Self::point_rng(sensor_index, t).gen(),
            _ => 0.0,
        };
        function.param.evaluate(t, uniform)
    }

    pub fn value(&self, sensor_index: usize, t: i64) -> Value {
        match self.data_types[sensor_index] {
            DataType::Text => {
                let text = Self::point_rng(sensor_index, t)
                    .sample_iter(&Alphanumeric)
                    .take(self.string_length)
                    .map(char::from)
                    .collect();
                Value::Text(text)
            }
            data_type => convert(self.numeric(sensor_index, t), data_type),
        }
    }

    /// One value per sensor, in sensor order.
    pub fn row(&self, t: i64) -> Vec<Value> {
        (0..self.sensor_count())
            .map(|sensor_index| self.value(sensor_index, t))
            .collect()
    }
}

fn convert(raw: f64, data_type: DataType) -> Value {
    match data_type {
        DataType::Boolean => Value::Boolean(raw > 0.0),
        // `as` saturates on overflow and maps NaN to zero.
        DataType::Int32 => Value::Int32(raw.round() as i32),
        DataType::Int64 => Value::Int64(raw.round() as i64),
        DataType::Float => Value::Float(raw as f32),
        DataType::Double => Value::Double(raw),
        DataType::Text => Value::Text(format!("{raw}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{ConstantParams, FunctionParam, LineParams, RandomParams};

    fn sensor(index: usize, param: FunctionParam) -> SensorFunction {
        SensorFunction {
            sensor_index: index,
            function_id: format!("f{index}"),
            param,
        }
    }

    fn generator(types: Vec<DataType>) -> DataPointGenerator {
        let functions = vec![
            sensor(0, FunctionParam::Random(RandomParams { min: -5.0, max: 5.0 })),
            sensor(
                1,
                FunctionParam::Line(LineParams {
                    slope: 0.5,
                    intercept: 3.0,
                }),
            ),
            sensor(2, FunctionParam::Constant(ConstantParams { value: 7.6 })),
        ];
        DataPointGenerator::new(functions, types, 8)
    }

    #[test]
    fn random_values_are_reproducible_and_bounded() {
        let gen = generator(vec![DataType::Double; 3]);
        for t in [0_i64, 1, 7_000, 1_535_558_400_000] {
            let a = gen.numeric(0, t);
            assert_eq!(a, gen.numeric(0, t));
            assert!((-5.0..=5.0).contains(&a));
        }
        assert_ne!(gen.numeric(0, 1), gen.numeric(0, 2));
    }

    #[test]
    fn values_take_the_sensor_type() {
        let gen = generator(vec![DataType::Boolean, DataType::Int64, DataType::Int32]);
        let row = gen.row(10);
        assert_eq!(row[1], Value::Int64(8));
        assert_eq!(row[2], Value::Int32(8));
        assert!(matches!(row[0], Value::Boolean(_)));
    }

    #[test]
    fn text_has_configured_length() {
        let gen = generator(vec![DataType::Text, DataType::Double, DataType::Float]);
        match gen.value(0, 42) {
            Value::Text(text) => {
                assert_eq!(text.len(), 8);
                assert!(text.chars().all(|c| c.is_ascii_alphanumeric()));
                assert_eq!(gen.value(0, 42), Value::Text(text));
            }
            other => panic!("expected text, got {other:?}"),
        }
        assert_eq!(gen.value(2, 0), Value::Float(7.6));
    }
}
