/// Something drawn onto the pen layer, in stage coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum PenInstruction {
  Line {
    size: f64,
    color: Color,
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
  },
  Stamp {
    costume: String,
    x: f64,
    y: f64,
    size: f64,
    direction: f64,
  },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
  pub r: u8,
  pub g: u8,
  pub b: u8,
  pub a: u8,
}

impl Color {
  pub const BLUE: Color = Color {
    r: 0,
    g: 0,
    b: 255,
    a: 255,
  };

  /// Reads `#rrggbb` text or a packed `0xAARRGGBB` number. Zero alpha
  /// means opaque, as in Scratch.
  pub fn parse(text: &str) -> Option<Color> {
    if let Some(hex) = text.strip_prefix('#') {
      if hex.len() != 6 {
        return None;
      }
      let packed = u32::from_str_radix(hex, 16).ok()?;
      return Some(Color::from_packed(packed | 0xff00_0000));
    }
    text.trim().parse::<f64>().ok().map(|number| Color::from_packed(number as i64 as u32))
  }

  pub fn from_packed(packed: u32) -> Color {
    let a = (packed >> 24) as u8;
    Color {
      r: (packed >> 16) as u8,
      g: (packed >> 8) as u8,
      b: packed as u8,
      a: if a == 0 { 255 } else { a },
    }
  }
}

/// A pen colour. Parameter changes work in HSV, so the colour stays in
/// HSV form once one has been applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PenColor {
  Rgba(Color),
  /// Hue in degrees `[0, 360)`, saturation and brightness in `[0, 100]`,
  /// alpha in `[0, 1]`.
  Hsva {
    hue: f64,
    saturation: f64,
    brightness: f64,
    alpha: f64,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorParam {
  Color,
  Saturation,
  Brightness,
  Transparency,
}

impl ColorParam {
  pub fn parse(name: &str) -> Option<ColorParam> {
    Some(match name {
      "color" => ColorParam::Color,
      "saturation" => ColorParam::Saturation,
      "brightness" => ColorParam::Brightness,
      "transparency" => ColorParam::Transparency,
      _ => return None,
    })
  }
}

impl PenColor {
  /// A colour set from a colour block. It is stored as HSV straight away,
  /// which floors the channels the way Scratch 3 draws them.
  pub fn shifted(color: Color) -> PenColor {
    PenColor::Rgba(color).to_hsva()
  }

  fn to_hsva(self) -> PenColor {
    match self {
      PenColor::Rgba(color) => {
        let (hue, saturation, value) = rgb_to_hsv(color.r, color.g, color.b);
        PenColor::Hsva {
          hue,
          saturation: saturation * 100.,
          brightness: value * 100.,
          alpha: color.a as f64 / 255.,
        }
      }
      hsva => hsva,
    }
  }

  pub fn rgba(&self) -> Color {
    match *self {
      PenColor::Rgba(color) => color,
      PenColor::Hsva {
        hue,
        saturation,
        brightness,
        alpha,
      } => {
        let (r, g, b) = hsv_to_rgb(hue / 360., saturation / 100., brightness / 100.);
        Color {
          r,
          g,
          b,
          a: (alpha * 255.).round() as u8,
        }
      }
    }
  }

  pub fn set_param(&mut self, param: ColorParam, value: f64) {
    self.update(param, |_| value);
  }

  pub fn change_param(&mut self, param: ColorParam, change: f64) {
    self.update(param, |current| current + change);
  }

  /// Applies `f` to the parameter in block units, where every parameter
  /// runs from 0 to 100.
  fn update(&mut self, param: ColorParam, f: impl FnOnce(f64) -> f64) {
    let PenColor::Hsva {
      hue,
      saturation,
      brightness,
      alpha,
    } = self.to_hsva()
    else {
      return;
    };
    let (mut hue, mut saturation, mut brightness, mut alpha) = (hue, saturation, brightness, alpha);
    match param {
      ColorParam::Color => {
        hue = (f(hue * 100. / 360.) * 360. / 100.) % 360.;
        if hue < 0. {
          hue += 360.;
        }
      }
      ColorParam::Saturation => saturation = f(saturation).clamp(0., 100.),
      ColorParam::Brightness => brightness = f(brightness).clamp(0., 100.),
      ColorParam::Transparency => alpha = (1. - f((1. - alpha) * 100.) / 100.).clamp(0., 1.),
    }
    *self = PenColor::Hsva {
      hue,
      saturation,
      brightness,
      alpha,
    };
  }
}

/// Hue in degrees, saturation and value in `[0, 1]`.
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
  let (r, g, b) = (r as f64 / 255., g as f64 / 255., b as f64 / 255.);
  let max = r.max(g).max(b);
  let min = r.min(g).min(b);
  let delta = max - min;
  let saturation = if max == 0. { 0. } else { delta / max };
  let hue = if delta == 0. {
    0.
  } else if max == r {
    (g - b) / delta + if g < b { 6. } else { 0. }
  } else if max == g {
    (b - r) / delta + 2.
  } else {
    (r - g) / delta + 4.
  };
  (hue / 6. * 360., saturation, max)
}

/// Hue in turns, saturation and value in `[0, 1]`. Channels are floored.
fn hsv_to_rgb(hue: f64, saturation: f64, value: f64) -> (u8, u8, u8) {
  let sector = (hue * 6.).floor();
  let f = hue * 6. - sector;
  let p = value * (1. - saturation);
  let q = value * (1. - f * saturation);
  let t = value * (1. - (1. - f) * saturation);
  let (r, g, b) = match (sector as i64).rem_euclid(6) {
    0 => (value, t, p),
    1 => (q, value, p),
    2 => (p, value, t),
    3 => (p, q, value),
    4 => (t, p, value),
    _ => (value, p, q),
  };
  ((r * 255.) as u8, (g * 255.) as u8, (b * 255.) as u8)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PenState {
  pub down: bool,
  pub size: f64,
  pub color: PenColor,
}

impl Default for PenState {
  fn default() -> Self {
    PenState {
      down: false,
      size: 1.,
      color: PenColor::Rgba(Color::BLUE),
    }
  }
}
