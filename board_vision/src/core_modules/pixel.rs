// THEORY (Single-Pixel Colour Math):
// The `Pixel` module is the most fundamental unit of the inspection engine. It is a
// "dumb" data container for one RGB pixel plus the colour-space transforms that can
// be computed from that pixel alone, with no knowledge of neighbours. Anything that
// needs a neighbourhood (histograms, morphology, contours) lives in the stage modules.
//
// What lives here:
// - Raw channels (RGB) and their normalized (0..1 sRGB) copies.
// - Brightness:   Rec. 601 luma, used both as the grayscale image and as the
//                 brightness cut of the LED segmenter.
// - HSV:          hue/saturation/value quantized to the 8-bit convention used by the
//                 LED colour ranges (H in 0..=180, S and V in 0..=255).
// - L*a*b*:       the luminance/chrominance split the normalizer equalizes on,
//                 quantized to 8 bits (L scaled to 0..=255, a and b offset by 128),
//                 with the inverse transform back to RGB.
//
// The sRGB -> linear conversion uses a 256-entry `OnceLock` LUT; the hot path is a
// table lookup, not a `powf` per pixel.

pub mod pixel {
    use image::Rgb;
    use std::sync::OnceLock;

    pub type Channel = u8;
    pub type NormalizedChannel = f32;
    pub type Hue = f32;
    pub type Luminance = f64;

    // D65 reference white used to normalize X and Z.
    const WHITE_X: f32 = 0.950_456;
    const WHITE_Z: f32 = 1.088_754;
    // CIE constants: (6/29)^3 and the slope of the linear segment.
    const LAB_EPSILON: f32 = 0.008_856;
    const LAB_KAPPA: f32 = 903.3;

    // Fast path: 256-entry LUT for sRGB (0..255) -> linear normalized (0..1)
    static SRGB_TO_LINEAR_LUT: OnceLock<[NormalizedChannel; 256]> = OnceLock::new();

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        pub red_normalized: NormalizedChannel,
        pub green_normalized: NormalizedChannel,
        pub blue_normalized: NormalizedChannel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Pixel {
                red,
                green,
                blue,
                red_normalized: red as NormalizedChannel / 255.0f32,
                green_normalized: green as NormalizedChannel / 255.0f32,
                blue_normalized: blue as NormalizedChannel / 255.0f32,
            }
        }

        #[inline]
        fn srgb_to_linear_normalized_from_byte(srgb_value: Channel) -> NormalizedChannel {
            let table = SRGB_TO_LINEAR_LUT.get_or_init(|| {
                let mut table = [0.0f32; 256];
                for (i, slot) in table.iter_mut().enumerate() {
                    let srgb_normalized = i as NormalizedChannel / 255.0f32;
                    *slot = if srgb_normalized <= 0.04045f32 {
                        srgb_normalized / 12.92f32
                    } else {
                        ((srgb_normalized + 0.055f32) / 1.055f32).powf(2.4f32)
                    };
                }
                table
            });
            table[srgb_value as usize]
        }

        #[inline]
        fn linear_normalized_to_srgb_byte(linear: f32) -> Channel {
            let linear = linear.clamp(0.0, 1.0);
            let srgb = if linear <= 0.003_130_8 {
                linear * 12.92
            } else {
                1.055 * linear.powf(1.0 / 2.4) - 0.055
            };
            (srgb * 255.0).round().clamp(0.0, 255.0) as Channel
        }

        /// =================================Heuristics==================================

        /// Luminance estimate (Rec. 601 luma) on the 0..255 scale.
        pub fn luminance(&self) -> Luminance {
            0.299_f64 * self.red as f64 + 0.587_f64 * self.green as f64 + 0.114_f64 * self.blue as f64
        }

        /// Luminance rounded to a grayscale byte.
        pub fn gray(&self) -> Channel {
            self.luminance().round().clamp(0.0, 255.0) as Channel
        }

        /// HSV value: the brightest channel (0..1).
        pub fn value_hsv(&self) -> NormalizedChannel {
            self.red_normalized.max(self.green_normalized.max(self.blue_normalized))
        }

        /// HSV saturation: chroma relative to value (0..1), zero for black.
        pub fn saturation_hsv(&self) -> NormalizedChannel {
            let value = self.value_hsv();
            if value <= 1e-6 {
                return 0.0;
            }
            let minimum = self.red_normalized.min(self.green_normalized.min(self.blue_normalized));
            (value - minimum) / value
        }

        /// Hue angle in degrees [0, 360), computed on normalized sRGB.
        pub fn hue(&self) -> Hue {
            let maximum_channel = self.value_hsv();
            let minimum_channel = self.red_normalized.min(self.green_normalized.min(self.blue_normalized));
            let chroma = maximum_channel - minimum_channel;

            if chroma <= 1e-6 {
                return 0.0;
            }

            let inverse_chroma = 1.0 / chroma;

            let (base_difference, sector_offset) = if maximum_channel == self.red_normalized {
                (self.green_normalized - self.blue_normalized, 0.0)
            } else if maximum_channel == self.green_normalized {
                (self.blue_normalized - self.red_normalized, 2.0)
            } else {
                (self.red_normalized - self.green_normalized, 4.0)
            };

            let mut hue_degrees = (base_difference * inverse_chroma + sector_offset) * 60.0;
            if hue_degrees < 0.0 {
                hue_degrees += 360.0;
            }
            hue_degrees
        }

        /// HSV quantized to bytes: H in 0..=180 (degrees / 2), S and V in 0..=255.
        pub fn hsv_bytes(&self) -> [Channel; 3] {
            let hue = (self.hue() / 2.0).round().clamp(0.0, 180.0) as Channel;
            let saturation = (self.saturation_hsv() * 255.0).round() as Channel;
            let value = self.red.max(self.green.max(self.blue));
            [hue, saturation, value]
        }

        /// CIE L*a*b* (D65) quantized to bytes: L scaled to 0..=255, a and b offset by 128.
        pub fn lab_bytes(&self) -> [Channel; 3] {
            let r = Self::srgb_to_linear_normalized_from_byte(self.red);
            let g = Self::srgb_to_linear_normalized_from_byte(self.green);
            let b = Self::srgb_to_linear_normalized_from_byte(self.blue);

            let x = (0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b) / WHITE_X;
            let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175_0 * b;
            let z = (0.019_333_9 * r + 0.119_192_0 * g + 0.950_304_1 * b) / WHITE_Z;

            let f = |t: f32| {
                if t > LAB_EPSILON {
                    t.cbrt()
                } else {
                    7.787 * t + 16.0 / 116.0
                }
            };
            let (fx, fy, fz) = (f(x), f(y), f(z));

            let lightness = if y > LAB_EPSILON {
                116.0 * fy - 16.0
            } else {
                LAB_KAPPA * y
            };
            let a = 500.0 * (fx - fy) + 128.0;
            let b = 200.0 * (fy - fz) + 128.0;

            [
                (lightness * 255.0 / 100.0).round().clamp(0.0, 255.0) as Channel,
                a.round().clamp(0.0, 255.0) as Channel,
                b.round().clamp(0.0, 255.0) as Channel,
            ]
        }

        /// Inverse of `lab_bytes`.
        pub fn from_lab_bytes(lab: [Channel; 3]) -> Self {
            let lightness = lab[0] as f32 * 100.0 / 255.0;
            let a = lab[1] as f32 - 128.0;
            let b = lab[2] as f32 - 128.0;

            let (y, fy) = if lightness > LAB_EPSILON * LAB_KAPPA {
                let fy = (lightness + 16.0) / 116.0;
                (fy * fy * fy, fy)
            } else {
                let y = lightness / LAB_KAPPA;
                (y, 7.787 * y + 16.0 / 116.0)
            };
            let fx = fy + a / 500.0;
            let fz = fy - b / 200.0;

            let finv = |t: f32| {
                let cube = t * t * t;
                if cube > LAB_EPSILON {
                    cube
                } else {
                    (t - 16.0 / 116.0) / 7.787
                }
            };
            let x = finv(fx) * WHITE_X;
            let z = finv(fz) * WHITE_Z;

            let r = 3.240_454_2 * x - 1.537_138_5 * y - 0.498_531_4 * z;
            let g = -0.969_266_0 * x + 1.876_010_8 * y + 0.041_556_0 * z;
            let bl = 0.055_643_4 * x - 0.204_025_9 * y + 1.057_225_2 * z;

            Pixel::new(
                Self::linear_normalized_to_srgb_byte(r),
                Self::linear_normalized_to_srgb_byte(g),
                Self::linear_normalized_to_srgb_byte(bl),
            )
        }
    }

    impl From<&Rgb<u8>> for Pixel {
        fn from(rgb: &Rgb<u8>) -> Self {
            Pixel::new(rgb[0], rgb[1], rgb[2])
        }
    }

    impl From<Pixel> for Rgb<u8> {
        fn from(pixel: Pixel) -> Self {
            Rgb([pixel.red, pixel.green, pixel.blue])
        }
    }
}
