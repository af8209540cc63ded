use super::{run_request, RunContext};
use spindle_schema::{
    BurnRequest, BurnSource, DeviceId, MediaCapacity, OperationRequest, WriteOptions,
};
use std::path::PathBuf;

pub struct BurnArgs {
    pub device: String,
    pub files: Vec<PathBuf>,
    pub image: Option<PathBuf>,
    pub audio: bool,
    pub label: Option<String>,
    pub options: WriteOptions,
    pub capacity: MediaCapacity,
}

impl BurnArgs {
    /// An image wins over files; `audio` turns the files into WAV tracks.
    pub fn into_request(self) -> OperationRequest {
        let source = match self.image {
            Some(image) => BurnSource::Image(image),
            None if self.audio => BurnSource::Audio(self.files),
            None => BurnSource::Files(self.files),
        };
        OperationRequest::Burn(BurnRequest {
            device: DeviceId::new(self.device),
            source,
            options: self.options,
            capacity: self.capacity,
            volume_label: self.label,
        })
    }
}

pub fn run(ctx: &RunContext<'_>, args: BurnArgs) -> Result<u8, String> {
    run_request(ctx, &args.into_request())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> BurnArgs {
        BurnArgs {
            device: "/dev/sr0".to_owned(),
            files: vec![PathBuf::from("a.wav"), PathBuf::from("b.wav")],
            image: None,
            audio: false,
            label: Some("BACKUP".to_owned()),
            options: WriteOptions::default(),
            capacity: MediaCapacity::default(),
        }
    }

    #[test]
    fn files_become_a_mastered_burn() {
        let OperationRequest::Burn(request) = args().into_request() else {
            panic!("expected a burn request");
        };
        assert_eq!(request.device.as_str(), "/dev/sr0");
        assert!(matches!(request.source, BurnSource::Files(ref f) if f.len() == 2));
        assert_eq!(request.volume_label.as_deref(), Some("BACKUP"));
    }

    #[test]
    fn audio_flag_selects_audio_tracks() {
        let mut a = args();
        a.audio = true;
        let OperationRequest::Burn(request) = a.into_request() else {
            panic!("expected a burn request");
        };
        assert!(matches!(request.source, BurnSource::Audio(_)));
    }

    #[test]
    fn image_wins_over_files() {
        let mut a = args();
        a.files.clear();
        a.image = Some(PathBuf::from("disc.iso"));
        let OperationRequest::Burn(request) = a.into_request() else {
            panic!("expected a burn request");
        };
        assert_eq!(request.source, BurnSource::Image(PathBuf::from("disc.iso")));
    }
}
