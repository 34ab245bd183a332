use std::path::PathBuf;
use std::time::Instant;

use vvtts_rs::blocking::Synthesizer;
use vvtts_rs::onnx::Onnxruntime;
use vvtts_rs::{StyleId, SynthesisOptions, SynthesizerOptions, VoiceModelFile};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let model_path = PathBuf::from(args.next().unwrap_or_else(|| "models/0.vvm".to_string()));
    let kana = args
        .next()
        .unwrap_or_else(|| "コンニチワ'、オゲ'ンキデス_カ？".to_string());

    let synthesizer = Synthesizer::new(Onnxruntime::new(), SynthesizerOptions::default());
    let scoped = synthesizer.scoped();

    let load_start = Instant::now();
    let model = VoiceModelFile::open(&model_path)?;
    scoped.load_voice_model(&model)?;
    println!("Model loaded in {:.2?}", load_start.elapsed());

    for character in scoped.metas()? {
        let styles = character
            .styles
            .iter()
            .map(|s| format!("{} ({}, {})", s.name, s.id, s.r#type))
            .collect::<Vec<_>>();
        println!("{}: {}", character.name, styles.join(", "));
    }

    let style_id = model
        .metas()
        .iter()
        .flat_map(|c| &c.styles)
        .find(|s| s.r#type == vvtts_rs::StyleType::Talk)
        .map(|s| s.id)
        .unwrap_or(StyleId(0));

    let synth_start = Instant::now();
    let query = scoped.audio_query_from_kana(&kana, style_id)?;
    let feature = scoped.precompute_render(&query, style_id, &SynthesisOptions::default())?;
    let wav = scoped.synthesis(&query, style_id, &SynthesisOptions::default())?;
    let synth_dur = synth_start.elapsed();

    let audio_duration = feature.frame_length() as f64 / feature.frame_rate();
    println!(
        "Synthesized {:.2}s audio in {:.2?} ({:.1}x real-time)",
        audio_duration,
        synth_dur,
        audio_duration / synth_dur.as_secs_f64()
    );

    std::fs::write("output.wav", wav)?;
    println!("Saved to output.wav");
    Ok(())
}
