use serde::Deserialize;
use tracing::warn;

use crate::color::Color;
use crate::engine::{AnimationEngine, DEFAULT_FADE_STEPS};
use crate::error::{Error, Result};
use crate::gradient;
use crate::strip::StripDevice;

/// A color command, from either the local REST surface or the discovered
/// server's stream. Tagged by `type` on the wire; anything unrecognized
/// lands on `Unknown` and is dropped by the dispatcher.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    Fill { value: Color },
    Gradient { stops: Vec<Color> },
    Rainbow,
    #[serde(other)]
    Unknown,
}

/// Validates a command and kicks off the fade it asks for.
///
/// Validation errors come back to the caller before anything reaches the
/// strip. The fade itself runs in the background so a superseding command
/// never waits for the one it replaces; a fade aborted by a hardware error
/// is logged here.
pub fn dispatch<D: StripDevice>(command: Command, engine: &AnimationEngine<D>) -> Result<()> {
    let led_count = engine.led_count();

    let target = match command {
        Command::Fill { value } => vec![value; led_count],
        Command::Gradient { stops } => gradient::gradient(&stops, led_count)?,
        Command::Rainbow => gradient::rainbow(led_count),
        Command::Unknown => return Err(Error::MalformedMessage),
    };

    let engine = engine.clone();
    tokio::spawn(async move {
        if let Err(e) = engine.fade_to(target, DEFAULT_FADE_STEPS).await {
            warn!(error = %e, "fade aborted");
        }
    });

    Ok(())
}
