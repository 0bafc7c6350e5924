use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::scene::GaussianCloud;

/// Rest coefficient property names in PLY order, channel-major.
pub(crate) const REST_FIELD_NAMES: [&str; 72] = spz_serde_macros::rest_field_names!();

fn de_quant<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Dequant;
    impl serde::de::Visitor<'_> for Dequant {
        type Value = Option<f32>;
        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a quantized value or a float")
        }
        fn visit_f32<E>(self, value: f32) -> Result<Option<f32>, E> {
            Ok(Some(value))
        }
        fn visit_f64<E>(self, value: f64) -> Result<Option<f32>, E> {
            Ok(Some(value as f32))
        }
        fn visit_u8<E>(self, value: u8) -> Result<Option<f32>, E> {
            Ok(Some(value as f32 / u8::MAX as f32))
        }
        fn visit_u16<E>(self, value: u16) -> Result<Option<f32>, E> {
            Ok(Some(value as f32 / u16::MAX as f32))
        }
        // Wide integer colors still hold 8 bit values.
        fn visit_i32<E>(self, value: i32) -> Result<Option<f32>, E> {
            Ok(Some(value as f32 / u8::MAX as f32))
        }
        fn visit_u32<E>(self, value: u32) -> Result<Option<f32>, E> {
            Ok(Some(value as f32 / u8::MAX as f32))
        }
    }
    deserializer.deserialize_any(Dequant)
}

/// One `vertex` row of a trained scene. Only the position is required by
/// serde, [`super::read_ply`] checks the header for the rest so a missing
/// property is reported by name.
#[spz_serde_macros::expand_rest_fields]
#[derive(Deserialize)]
pub(crate) struct PlyGaussian {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) z: f32,

    // Log scales.
    #[serde(default)]
    pub(crate) scale_0: f32,
    #[serde(default)]
    pub(crate) scale_1: f32,
    #[serde(default)]
    pub(crate) scale_2: f32,
    // Logit.
    #[serde(default)]
    pub(crate) opacity: f32,
    // Scalar first.
    #[serde(default)]
    pub(crate) rot_0: f32,
    #[serde(default)]
    pub(crate) rot_1: f32,
    #[serde(default)]
    pub(crate) rot_2: f32,
    #[serde(default)]
    pub(crate) rot_3: f32,

    #[serde(default)]
    pub(crate) f_dc_0: f32,
    #[serde(default)]
    pub(crate) f_dc_1: f32,
    #[serde(default)]
    pub(crate) f_dc_2: f32,

    // Expands to f_rest_0 ..= f_rest_71, enough for a degree 4 file.
    #[serde(default)]
    pub(crate) _rest: (),

    // Fallback for point clouds without f_dc_*, in [0, 1] once read.
    #[serde(default, alias = "r", deserialize_with = "de_quant")]
    pub(crate) red: Option<f32>,
    #[serde(default, alias = "g", deserialize_with = "de_quant")]
    pub(crate) green: Option<f32>,
    #[serde(default, alias = "b", deserialize_with = "de_quant")]
    pub(crate) blue: Option<f32>,
}

#[derive(Deserialize)]
pub(crate) struct PlyInput {
    pub(crate) vertex: Vec<PlyGaussian>,
}

/// Property names written for a scene with `coeffs` rest coefficients per
/// channel, in file order.
pub(crate) fn property_names(coeffs: usize) -> Vec<&'static str> {
    let mut names = vec!["x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2"];
    names.extend(&REST_FIELD_NAMES[..coeffs * 3]);
    names.extend([
        "opacity", "scale_0", "scale_1", "scale_2", "rot_0", "rot_1", "rot_2", "rot_3",
    ]);
    names
}

/// Borrowed view of one point, serialized with exactly the properties its
/// SH degree needs.
pub(crate) struct VertexRow<'a> {
    cloud: &'a GaussianCloud,
    index: usize,
}

impl VertexRow<'_> {
    fn values(&self) -> impl Iterator<Item = f32> + '_ {
        let cloud = self.cloud;
        let i = self.index;
        let coeffs = cloud.sh_coeffs_per_point();
        let sh = cloud.sh_coeffs(i);
        let rotation = cloud.rotation(i);

        // Model SH is coefficient-major, PLY wants every coefficient of one
        // channel before the next.
        let rest = (0..3).flat_map(move |channel| (0..coeffs).map(move |c| sh[c * 3 + channel]));

        cloud.position(i)
            .to_array()
            .into_iter()
            .chain(cloud.color(i).to_array())
            .chain(rest)
            .chain([cloud.alphas[i]])
            .chain(cloud.scale(i).to_array())
            .chain([rotation.w, rotation.x, rotation.y, rotation.z])
    }
}

impl Serialize for VertexRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names = property_names(self.cloud.sh_coeffs_per_point());
        let mut row = serializer.serialize_struct("vertex", names.len())?;
        for (name, value) in names.into_iter().zip(self.values()) {
            row.serialize_field(name, &value)?;
        }
        row.end()
    }
}

#[derive(Serialize)]
pub(crate) struct PlyOutput<'a> {
    pub(crate) vertex: Vec<VertexRow<'a>>,
}

impl<'a> PlyOutput<'a> {
    pub(crate) fn new(cloud: &'a GaussianCloud) -> Self {
        Self {
            vertex: (0..cloud.num_points)
                .map(|index| VertexRow { cloud, index })
                .collect(),
        }
    }
}
