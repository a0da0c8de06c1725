// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Raw recording playback.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rfa_core::{IqFormat, RawPacket, Source, SourceError};
use tracing::debug;

use super::{PacketProducer, PacketPump, Produced, SourceSettings};

/// Plays a raw interleaved IQ file back packet by packet.
///
/// A trailing partial packet is skipped. Without looping the end of the
/// file ends the packet stream.
pub struct FileSource {
    path: PathBuf,
    loop_playback: bool,
    pump: PacketPump,
}

impl FileSource {
    pub fn open(
        path: impl AsRef<Path>,
        settings: SourceSettings,
        loop_playback: bool,
    ) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let len = std::fs::metadata(&path)
            .map_err(|e| SourceError::Open(path.display().to_string(), e.to_string()))?
            .len();
        if len < settings.packet_size as u64 {
            return Err(SourceError::Open(
                path.display().to_string(),
                format!("file holds less than one packet ({} bytes)", settings.packet_size),
            ));
        }
        Ok(Self {
            path,
            loop_playback,
            pump: PacketPump::new("file", settings),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

struct FileReader {
    reader: BufReader<File>,
    loop_playback: bool,
}

impl PacketProducer for FileReader {
    fn produce(&mut self, packet: &mut [u8]) -> io::Result<Produced> {
        match self.reader.read_exact(packet) {
            Ok(()) => Ok(Produced::Packet),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                if !self.loop_playback {
                    return Ok(Produced::Exhausted);
                }
                debug!("End of recording, rewinding");
                self.reader.seek(SeekFrom::Start(0))?;
                self.reader.read_exact(packet)?;
                Ok(Produced::Packet)
            }
            Err(e) => Err(e),
        }
    }
}

impl Source for FileSource {
    fn name(&self) -> &str {
        self.pump.name()
    }

    fn format(&self) -> IqFormat {
        self.pump.settings().format
    }

    fn packet_size(&self) -> usize {
        self.pump.settings().packet_size
    }

    fn get_packet(&self, timeout: Duration) -> Option<RawPacket> {
        self.pump.get_packet(timeout)
    }

    fn return_packet(&self, packet: RawPacket) {
        self.pump.return_packet(packet);
    }

    fn start_sampling(&self) -> Result<(), SourceError> {
        let file = File::open(&self.path)
            .map_err(|e| SourceError::Start(self.path.display().to_string(), e.to_string()))?;
        self.pump.start(Box::new(FileReader {
            reader: BufReader::new(file),
            loop_playback: self.loop_playback,
        }))
    }

    fn stop_sampling(&self) {
        self.pump.stop();
    }

    fn sample_rate(&self) -> u32 {
        self.pump.settings().sample_rate
    }

    fn min_sample_rate(&self) -> u32 {
        self.pump.settings().min_sample_rate
    }

    fn max_sample_rate(&self) -> u32 {
        self.pump.settings().max_sample_rate
    }

    fn frequency(&self) -> i64 {
        self.pump.settings().frequency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn recording(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn settings() -> SourceSettings {
        SourceSettings::new(IqFormat::Unsigned8, 48_000, 100_000_000, 4)
    }

    fn drain(source: &FileSource, max: usize) -> Vec<RawPacket> {
        let mut packets = Vec::new();
        while packets.len() < max {
            let Some(packet) = source.get_packet(Duration::from_secs(1)) else {
                break;
            };
            packets.push(packet.clone());
            source.return_packet(packet);
        }
        packets
    }

    #[test]
    fn plays_whole_packets_then_ends() {
        let file = recording(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let source = FileSource::open(file.path(), settings(), false).unwrap();
        assert_eq!(source.sampled_packet_size(), 2);
        source.start_sampling().unwrap();
        let packets = drain(&source, 10);
        assert_eq!(packets, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        source.stop_sampling();
    }

    #[test]
    fn looping_rewinds() {
        let file = recording(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let source = FileSource::open(file.path(), settings(), true).unwrap();
        source.start_sampling().unwrap();
        let packets = drain(&source, 5);
        assert_eq!(packets.len(), 5);
        assert_eq!(packets[2], vec![1, 2, 3, 4]);
        assert_eq!(packets[4], vec![1, 2, 3, 4]);
        source.stop_sampling();
    }

    #[test]
    fn rejects_missing_or_short_files() {
        assert!(matches!(
            FileSource::open("/nonexistent/capture.u8", settings(), false),
            Err(SourceError::Open(..))
        ));
        let file = recording(&[1, 2]);
        assert!(FileSource::open(file.path(), settings(), false).is_err());
    }
}
