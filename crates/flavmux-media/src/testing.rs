//! Hand-assembled MP4 fixtures.
//!
//! Everything here writes bytes directly so that tests of the parser and the
//! writer never depend on the code they check.

use bytes::BufMut;

/// One track of a fixture file.
#[derive(Debug, Clone)]
pub struct FixtureTrack {
    handler: [u8; 4],
    timescale: u32,
    codec: [u8; 4],
    delta: u32,
    stts: Option<Vec<(u32, u32)>>,
    chunks: Vec<Vec<Vec<u8>>>,
    constant_size: bool,
    broken_handler: bool,
}

impl FixtureTrack {
    /// Empty track with the given handler type.
    pub fn new(handler: &[u8; 4], timescale: u32) -> Self {
        Self {
            handler: *handler,
            timescale,
            codec: *b"raw5",
            delta: 1,
            stts: None,
            chunks: Vec::new(),
            constant_size: false,
            broken_handler: false,
        }
    }

    /// Append a chunk holding these samples.
    pub fn chunk(mut self, samples: &[&[u8]]) -> Self {
        self.chunks.push(samples.iter().map(|s| s.to_vec()).collect());
        self
    }

    /// `count` chunks of `per_chunk` samples, each `sample_len` bytes filled
    /// with a per-chunk marker byte.
    pub fn uniform_chunks(mut self, count: usize, per_chunk: usize, sample_len: usize) -> Self {
        for _ in 0..count {
            let marker = self.chunks.len() as u8;
            self.chunks.push(vec![vec![marker; sample_len]; per_chunk]);
        }
        self
    }

    /// Duration of every sample when no explicit table is given.
    pub fn delta(mut self, delta: u32) -> Self {
        self.delta = delta;
        self
    }

    /// Explicit `(count, delta)` runs.
    pub fn stts(mut self, runs: &[(u32, u32)]) -> Self {
        self.stts = Some(runs.to_vec());
        self
    }

    pub fn codec(mut self, codec: &[u8; 4]) -> Self {
        self.codec = *codec;
        self
    }

    /// Write `stsz` in its constant form. All samples must share one size.
    pub fn constant_size(mut self) -> Self {
        self.constant_size = true;
        self
    }

    /// Write an `hdlr` too short to decode.
    pub fn broken_handler(mut self) -> Self {
        self.broken_handler = true;
        self
    }

    fn sample_count(&self) -> u32 {
        self.chunks.iter().map(|c| c.len() as u32).sum()
    }

    fn time_runs(&self) -> Vec<(u32, u32)> {
        match &self.stts {
            Some(runs) => runs.clone(),
            None if self.sample_count() == 0 => Vec::new(),
            None => vec![(self.sample_count(), self.delta)],
        }
    }

    fn payload_len(&self) -> usize {
        self.chunks.iter().flatten().map(Vec::len).sum()
    }
}

/// Builder for a complete file image.
#[derive(Debug, Clone)]
pub struct FixtureBuilder {
    movie_timescale: u32,
    tracks: Vec<FixtureTrack>,
    mdat_first: bool,
    large_mdat: bool,
    leading: Vec<([u8; 4], Vec<u8>)>,
    moov_extra: Vec<([u8; 4], Vec<u8>)>,
}

impl Default for FixtureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self {
            movie_timescale: 1000,
            tracks: Vec::new(),
            mdat_first: false,
            large_mdat: false,
            leading: Vec::new(),
            moov_extra: Vec::new(),
        }
    }

    pub fn track(mut self, track: FixtureTrack) -> Self {
        self.tracks.push(track);
        self
    }

    /// Put `mdat` before `moov`.
    pub fn mdat_first(mut self) -> Self {
        self.mdat_first = true;
        self
    }

    /// Declare the `mdat` size through the 64-bit extended field.
    pub fn large_mdat(mut self) -> Self {
        self.large_mdat = true;
        self
    }

    /// Extra top-level box between `ftyp` and the rest.
    pub fn leading_box(mut self, box_type: &[u8; 4], body: &[u8]) -> Self {
        self.leading.push((*box_type, body.to_vec()));
        self
    }

    /// Extra child appended to `moov` after the tracks.
    pub fn moov_child(mut self, box_type: &[u8; 4], body: &[u8]) -> Self {
        self.moov_extra.push((*box_type, body.to_vec()));
        self
    }

    /// Assemble the file. Track payloads are stored one track after another,
    /// in chunk order.
    pub fn build(&self) -> Vec<u8> {
        let mut head = Vec::new();
        put_box(&mut head, b"ftyp", &ftyp_body());
        for (box_type, body) in &self.leading {
            put_box(&mut head, box_type, body);
        }

        let mdat_header_len = if self.large_mdat { 16 } else { 8 };
        let payload: Vec<u8> = self
            .tracks
            .iter()
            .flat_map(|t| t.chunks.iter().flatten().flatten().copied())
            .collect();

        let data_offset = if self.mdat_first {
            head.len() + mdat_header_len
        } else {
            let probe = self.moov(0);
            head.len() + probe.len() + mdat_header_len
        };
        let moov = self.moov(data_offset as u64);

        let mut mdat = Vec::new();
        if self.large_mdat {
            mdat.put_u32(1);
            mdat.put_slice(b"mdat");
            mdat.put_u64((payload.len() + 16) as u64);
            mdat.put_slice(&payload);
        } else {
            put_box(&mut mdat, b"mdat", &payload);
        }

        let mut out = head;
        if self.mdat_first {
            out.extend_from_slice(&mdat);
            out.extend_from_slice(&moov);
        } else {
            out.extend_from_slice(&moov);
            out.extend_from_slice(&mdat);
        }
        out
    }

    fn moov(&self, data_offset: u64) -> Vec<u8> {
        let mut body = Vec::new();
        put_box(
            &mut body,
            b"mvhd",
            &mvhd_body(self.movie_timescale, self.tracks.len() as u32 + 1),
        );
        let mut offset = data_offset;
        for (i, track) in self.tracks.iter().enumerate() {
            put_box(&mut body, b"trak", &trak_body(track, i as u32 + 1, offset));
            offset += track.payload_len() as u64;
        }
        for (box_type, extra) in &self.moov_extra {
            put_box(&mut body, box_type, extra);
        }
        let mut out = Vec::new();
        put_box(&mut out, b"moov", &body);
        out
    }
}

fn put_box(out: &mut Vec<u8>, box_type: &[u8; 4], body: &[u8]) {
    out.put_u32((body.len() + 8) as u32);
    out.put_slice(box_type);
    out.put_slice(body);
}

fn put_matrix(out: &mut Vec<u8>) {
    for v in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        out.put_u32(v);
    }
}

fn ftyp_body() -> Vec<u8> {
    let mut b = Vec::new();
    b.put_slice(b"isom");
    b.put_u32(0x200);
    b.put_slice(b"isom");
    b.put_slice(b"mp41");
    b
}

fn mvhd_body(timescale: u32, next_track_id: u32) -> Vec<u8> {
    let mut b = Vec::new();
    b.put_u32(0);
    b.put_u32(0);
    b.put_u32(0);
    b.put_u32(timescale);
    b.put_u32(0);
    b.put_u32(0x0001_0000);
    b.put_u16(0x0100);
    b.put_slice(&[0; 10]);
    put_matrix(&mut b);
    b.put_slice(&[0; 24]);
    b.put_u32(next_track_id);
    b
}

fn trak_body(track: &FixtureTrack, track_id: u32, data_offset: u64) -> Vec<u8> {
    let mut tkhd = Vec::new();
    tkhd.put_u32(0x0000_0003);
    tkhd.put_u32(0);
    tkhd.put_u32(0);
    tkhd.put_u32(track_id);
    tkhd.put_u32(0);
    tkhd.put_u32(0);
    tkhd.put_slice(&[0; 8]);
    tkhd.put_u16(0);
    tkhd.put_u16(0);
    tkhd.put_u16(0);
    tkhd.put_u16(0);
    put_matrix(&mut tkhd);
    tkhd.put_u32(0);
    tkhd.put_u32(0);

    let duration: u64 = track
        .time_runs()
        .iter()
        .map(|(n, d)| u64::from(*n) * u64::from(*d))
        .sum();
    let mut mdhd = Vec::new();
    mdhd.put_u32(0);
    mdhd.put_u32(0);
    mdhd.put_u32(0);
    mdhd.put_u32(track.timescale);
    mdhd.put_u32(duration as u32);
    mdhd.put_u16(0x55c4);
    mdhd.put_u16(0);

    let mut hdlr = Vec::new();
    hdlr.put_u32(0);
    if !track.broken_handler {
        hdlr.put_u32(0);
        hdlr.put_slice(&track.handler);
        hdlr.put_slice(&[0; 12]);
        hdlr.put_slice(b"fixture\0");
    }

    let mut media_header = Vec::new();
    let media_header_type: &[u8; 4] = match &track.handler {
        b"vide" => {
            media_header.put_u32(1);
            media_header.put_slice(&[0; 8]);
            b"vmhd"
        }
        b"soun" => {
            media_header.put_u32(0);
            media_header.put_u32(0);
            b"smhd"
        }
        _ => {
            media_header.put_u32(0);
            b"nmhd"
        }
    };

    let mut url = Vec::new();
    put_box(&mut url, b"url ", &[0, 0, 0, 1]);
    let mut dref = Vec::new();
    dref.put_u32(0);
    dref.put_u32(1);
    dref.extend_from_slice(&url);
    let mut dinf = Vec::new();
    put_box(&mut dinf, b"dref", &dref);

    let mut minf = Vec::new();
    put_box(&mut minf, media_header_type, &media_header);
    put_box(&mut minf, b"dinf", &dinf);
    put_box(&mut minf, b"stbl", &stbl_body(track, data_offset));

    let mut mdia = Vec::new();
    put_box(&mut mdia, b"mdhd", &mdhd);
    put_box(&mut mdia, b"hdlr", &hdlr);
    put_box(&mut mdia, b"minf", &minf);

    let mut trak = Vec::new();
    put_box(&mut trak, b"tkhd", &tkhd);
    put_box(&mut trak, b"mdia", &mdia);
    trak
}

fn stbl_body(track: &FixtureTrack, data_offset: u64) -> Vec<u8> {
    let mut stsd = Vec::new();
    stsd.put_u32(0);
    stsd.put_u32(1);
    stsd.put_u32(16);
    stsd.put_slice(&track.codec);
    stsd.put_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);

    let runs = track.time_runs();
    let mut stts = Vec::new();
    stts.put_u32(0);
    stts.put_u32(runs.len() as u32);
    for (count, delta) in runs {
        stts.put_u32(count);
        stts.put_u32(delta);
    }

    let mut stsc_runs: Vec<(u32, u32)> = Vec::new();
    for (i, chunk) in track.chunks.iter().enumerate() {
        let n = chunk.len() as u32;
        if stsc_runs.last().map(|(_, last)| *last) != Some(n) {
            stsc_runs.push((i as u32 + 1, n));
        }
    }
    let mut stsc = Vec::new();
    stsc.put_u32(0);
    stsc.put_u32(stsc_runs.len() as u32);
    for (first_chunk, per_chunk) in stsc_runs {
        stsc.put_u32(first_chunk);
        stsc.put_u32(per_chunk);
        stsc.put_u32(1);
    }

    let sizes: Vec<u32> = track.chunks.iter().flatten().map(|s| s.len() as u32).collect();
    let mut stsz = Vec::new();
    stsz.put_u32(0);
    if track.constant_size && !sizes.is_empty() {
        stsz.put_u32(sizes[0]);
        stsz.put_u32(sizes.len() as u32);
    } else {
        stsz.put_u32(0);
        stsz.put_u32(sizes.len() as u32);
        for s in &sizes {
            stsz.put_u32(*s);
        }
    }

    let mut stco = Vec::new();
    stco.put_u32(0);
    stco.put_u32(track.chunks.len() as u32);
    let mut offset = data_offset;
    for chunk in &track.chunks {
        stco.put_u32(offset as u32);
        offset += chunk.iter().map(|s| s.len() as u64).sum::<u64>();
    }

    let mut stbl = Vec::new();
    put_box(&mut stbl, b"stsd", &stsd);
    put_box(&mut stbl, b"stts", &stts);
    put_box(&mut stbl, b"stsc", &stsc);
    put_box(&mut stbl, b"stsz", &stsz);
    put_box(&mut stbl, b"stco", &stco);
    stbl
}

/// Video track of `chunks` one-second chunks (timescale 1000), each holding
/// one 10-byte sample.
pub fn video_track(chunks: usize) -> FixtureTrack {
    FixtureTrack::new(b"vide", 1000)
        .delta(1000)
        .uniform_chunks(chunks, 1, 10)
        .codec(b"avc1")
}

/// Sound track whose `chunks` chunks each hold three 4-byte samples of 500
/// ticks (timescale 1000), so chunk `k` begins at `1.5 * k` seconds.
pub fn sound_track(chunks: usize) -> FixtureTrack {
    FixtureTrack::new(b"soun", 1000)
        .delta(500)
        .uniform_chunks(chunks, 3, 4)
        .codec(b"mp4a")
}
