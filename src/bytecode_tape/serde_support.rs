use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::float::Float;
use crate::opcode::{Addr, OpCode};

use super::Tape;

impl<F: Float + Serialize> Serialize for Tape<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Tape", 6)?;
        s.serialize_field("ops", &self.ops)?;
        s.serialize_field("arg_start", &self.arg_start)?;
        s.serialize_field("args", &self.args)?;
        s.serialize_field("parameters", &self.parameters)?;
        s.serialize_field("num_load", &self.num_load)?;
        s.serialize_field("dependents", &self.dependents)?;
        s.end()
    }
}

impl<'de, F: Float + Deserialize<'de>> Deserialize<'de> for Tape<F> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct TapeData<F> {
            ops: Vec<OpCode>,
            arg_start: Vec<u32>,
            args: Vec<Addr>,
            parameters: Vec<F>,
            #[serde(default)]
            num_load: usize,
            #[serde(default)]
            dependents: Vec<Addr>,
        }

        let data = TapeData::<F>::deserialize(deserializer)?;
        // Derived counts are recomputed and every invariant is rechecked.
        Tape::from_parts(
            data.ops,
            data.arg_start,
            data.args,
            data.parameters,
            data.num_load,
            data.dependents,
        )
        .map_err(serde::de::Error::custom)
    }
}
