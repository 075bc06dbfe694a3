#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use apng::{
        capabilities, create_handler, decode, ApngDecoder, ApngError, ImageOption, OptionValue,
        Raster,
    };
    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    const SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    const DISPOSE_NONE: u8 = 0;
    const DISPOSE_BACKGROUND: u8 = 1;
    const DISPOSE_PREVIOUS: u8 = 2;
    const BLEND_SOURCE: u8 = 0;
    const BLEND_OVER: u8 = 1;

    fn crc32(data: &[u8]) -> u32 {
        let mut table = [0u32; 256];
        for n in 0..256u32 {
            let mut c = n;
            for _ in 0..8 {
                c = if c & 1 == 1 { 0xedb88320 ^ (c >> 1) } else { c >> 1 };
            }
            table[n as usize] = c;
        }

        let mut c = 0xffffffffu32;
        for &b in data {
            c = table[((c ^ b as u32) & 0xff) as usize] ^ (c >> 8);
        }
        c ^ 0xffffffff
    }

    fn chunk(name: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut crc_data = name.to_vec();
        crc_data.extend_from_slice(data);

        let mut out = Vec::new();
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(data);
        out.extend_from_slice(&crc32(&crc_data).to_be_bytes());
        out
    }

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn ihdr(width: u32, height: u32, bit_depth: u8, color_type: u8, interlace: u8) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[bit_depth, color_type, 0, 0, interlace]);
        chunk(b"IHDR", &data)
    }

    fn actl(num_frames: u32, num_plays: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&num_frames.to_be_bytes());
        data.extend_from_slice(&num_plays.to_be_bytes());
        chunk(b"acTL", &data)
    }

    fn fctl(
        seq: u32,
        width: u32,
        height: u32,
        x: u32,
        y: u32,
        delay_num: u16,
        delay_den: u16,
        dispose_op: u8,
        blend_op: u8,
    ) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&seq.to_be_bytes());
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&x.to_be_bytes());
        data.extend_from_slice(&y.to_be_bytes());
        data.extend_from_slice(&delay_num.to_be_bytes());
        data.extend_from_slice(&delay_den.to_be_bytes());
        data.push(dispose_op);
        data.push(blend_op);
        chunk(b"fcTL", &data)
    }

    fn idat(scanlines: &[u8]) -> Vec<u8> {
        chunk(b"IDAT", &compress(scanlines))
    }

    fn fdat(seq: u32, scanlines: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&seq.to_be_bytes());
        data.extend_from_slice(&compress(scanlines));
        chunk(b"fdAT", &data)
    }

    fn iend() -> Vec<u8> {
        chunk(b"IEND", &[])
    }

    /// Unfiltered RGBA8 scanlines for a solid-colored rectangle.
    fn solid_scanlines(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let mut out = Vec::new();
        for _ in 0..height {
            out.push(0);
            for _ in 0..width {
                out.extend_from_slice(&color);
            }
        }
        out
    }

    fn stream(parts: &[Vec<u8>]) -> Vec<u8> {
        let mut out = SIGNATURE.to_vec();
        for part in parts {
            out.extend_from_slice(part);
        }
        out
    }

    fn solid_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        stream(&[
            ihdr(width, height, 8, 6, 0),
            idat(&solid_scanlines(width, height, color)),
            iend(),
        ])
    }

    fn assert_all_pixels(frame: &Raster, expected: [u8; 4]) {
        for y in 0..frame.height() {
            for x in 0..frame.width() {
                assert_eq!(frame.pixel(x, y), expected, "pixel ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_single_frame_png() {
        let sequence = decode(Cursor::new(solid_png(2, 2, [255, 0, 0, 255]))).unwrap();

        assert_eq!(sequence.len(), 1);
        assert_eq!(sequence.loop_count(), 0);
        assert_eq!(sequence.delays_ms(), &[0]);
        assert_all_pixels(&sequence.frames()[0], [255, 0, 0, 255]);
    }

    #[test]
    fn test_two_frame_full_canvas() {
        let data = stream(&[
            ihdr(2, 2, 8, 6, 0),
            actl(2, 0),
            fctl(0, 2, 2, 0, 0, 10, 100, DISPOSE_NONE, BLEND_SOURCE),
            idat(&solid_scanlines(2, 2, [255, 0, 0, 255])),
            fctl(1, 2, 2, 0, 0, 10, 100, DISPOSE_NONE, BLEND_SOURCE),
            fdat(2, &solid_scanlines(2, 2, [0, 0, 255, 255])),
            iend(),
        ]);

        let sequence = decode(Cursor::new(data)).unwrap();

        assert_eq!(sequence.len(), 2);
        assert_eq!(sequence.loop_count(), -1);
        assert_eq!(sequence.delays_ms(), &[100, 100]);
        assert_all_pixels(&sequence.frames()[0], [255, 0, 0, 255]);
        assert_all_pixels(&sequence.frames()[1], [0, 0, 255, 255]);
    }

    #[test]
    fn test_hidden_first_frame() {
        // no fcTL before IDAT, so the black default image never shows
        let data = stream(&[
            ihdr(2, 2, 8, 6, 0),
            actl(1, 3),
            idat(&solid_scanlines(2, 2, [0, 0, 0, 255])),
            fctl(0, 2, 2, 0, 0, 1, 10, DISPOSE_NONE, BLEND_SOURCE),
            fdat(1, &solid_scanlines(2, 2, [255, 255, 255, 255])),
            iend(),
        ]);

        let sequence = decode(Cursor::new(data)).unwrap();

        assert_eq!(sequence.len(), 1);
        assert_eq!(sequence.loop_count(), 2);
        assert_eq!(sequence.delays_ms(), &[100]);
        assert_all_pixels(&sequence.frames()[0], [255, 255, 255, 255]);
    }

    #[test]
    fn test_over_blend() {
        let data = stream(&[
            ihdr(2, 2, 8, 6, 0),
            actl(3, 1),
            fctl(0, 2, 2, 0, 0, 1, 10, DISPOSE_NONE, BLEND_OVER),
            idat(&solid_scanlines(2, 2, [255, 0, 0, 255])),
            fctl(1, 2, 2, 0, 0, 1, 10, DISPOSE_NONE, BLEND_OVER),
            fdat(2, &solid_scanlines(2, 2, [0, 255, 0, 127])),
            fctl(3, 2, 2, 0, 0, 1, 10, DISPOSE_NONE, BLEND_SOURCE),
            fdat(4, &solid_scanlines(2, 2, [0, 0, 255, 255])),
            iend(),
        ]);

        let sequence = decode(Cursor::new(data)).unwrap();

        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.loop_count(), 0);
        assert_eq!(sequence.delays_ms(), &[100, 100, 100]);

        // half-alpha green over opaque red, rounded to nearest
        assert_all_pixels(&sequence.frames()[0], [255, 0, 0, 255]);
        assert_all_pixels(&sequence.frames()[1], [128, 127, 0, 255]);
        assert_all_pixels(&sequence.frames()[2], [0, 0, 255, 255]);
    }

    #[test]
    fn test_source_blend_subrect() {
        let data = stream(&[
            ihdr(2, 2, 8, 6, 0),
            actl(2, 1),
            fctl(0, 2, 2, 0, 0, 1, 10, DISPOSE_NONE, BLEND_SOURCE),
            idat(&solid_scanlines(2, 2, [255, 0, 0, 255])),
            fctl(1, 1, 1, 1, 1, 1, 10, DISPOSE_PREVIOUS, BLEND_SOURCE),
            fdat(2, &solid_scanlines(1, 1, [0, 255, 0, 255])),
            iend(),
        ]);

        let sequence = decode(Cursor::new(data)).unwrap();

        assert_eq!(sequence.len(), 2);
        assert_all_pixels(&sequence.frames()[0], [255, 0, 0, 255]);

        let second = &sequence.frames()[1];
        assert_eq!(second.pixel(1, 1), [0, 255, 0, 255]);
        assert_eq!(second.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(second.pixel(1, 0), [255, 0, 0, 255]);
        assert_eq!(second.pixel(0, 1), [255, 0, 0, 255]);
    }

    #[test]
    fn test_previous_disposal_restores_canvas() {
        // frame 1 disposes to the canvas saved before its composition, so
        // frame 2 starts from frame 0's pixels again
        let data = stream(&[
            ihdr(2, 2, 8, 6, 0),
            actl(3, 1),
            fctl(0, 2, 2, 0, 0, 1, 10, DISPOSE_NONE, BLEND_SOURCE),
            idat(&solid_scanlines(2, 2, [255, 0, 0, 255])),
            fctl(1, 1, 1, 1, 1, 1, 10, DISPOSE_PREVIOUS, BLEND_SOURCE),
            fdat(2, &solid_scanlines(1, 1, [0, 255, 0, 255])),
            fctl(3, 1, 1, 0, 0, 1, 10, DISPOSE_NONE, BLEND_OVER),
            fdat(4, &solid_scanlines(1, 1, [0, 0, 0, 0])),
            iend(),
        ]);

        let sequence = decode(Cursor::new(data)).unwrap();

        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.frames()[1].pixel(1, 1), [0, 255, 0, 255]);

        // transparent over the restored canvas changes nothing
        assert_all_pixels(&sequence.frames()[2], [255, 0, 0, 255]);
    }

    #[test]
    fn test_background_disposal() {
        let data = stream(&[
            ihdr(2, 2, 8, 6, 0),
            actl(3, 1),
            fctl(0, 2, 2, 0, 0, 1, 10, DISPOSE_NONE, BLEND_SOURCE),
            idat(&solid_scanlines(2, 2, [255, 0, 0, 255])),
            fctl(1, 1, 1, 1, 1, 1, 10, DISPOSE_BACKGROUND, BLEND_SOURCE),
            fdat(2, &solid_scanlines(1, 1, [0, 255, 0, 255])),
            fctl(3, 1, 1, 1, 1, 1, 10, DISPOSE_NONE, BLEND_OVER),
            fdat(4, &solid_scanlines(1, 1, [0, 0, 0, 0])),
            iend(),
        ]);

        let sequence = decode(Cursor::new(data)).unwrap();

        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.frames()[1].pixel(1, 1), [0, 255, 0, 255]);

        // background disposal cleared exactly the frame's region
        let third = &sequence.frames()[2];
        assert_eq!(third.pixel(1, 1), [0, 0, 0, 0]);
        assert_eq!(third.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(third.pixel(1, 0), [255, 0, 0, 255]);
        assert_eq!(third.pixel(0, 1), [255, 0, 0, 255]);
    }

    #[test]
    fn test_delay_conversion() {
        let data = stream(&[
            ihdr(1, 1, 8, 6, 0),
            actl(3, 1),
            fctl(0, 1, 1, 0, 0, 5, 0, DISPOSE_NONE, BLEND_SOURCE),
            idat(&solid_scanlines(1, 1, [1, 2, 3, 255])),
            fctl(1, 1, 1, 0, 0, 1, 3, DISPOSE_NONE, BLEND_SOURCE),
            fdat(2, &solid_scanlines(1, 1, [4, 5, 6, 255])),
            fctl(3, 1, 1, 0, 0, 2, 3, DISPOSE_NONE, BLEND_SOURCE),
            fdat(4, &solid_scanlines(1, 1, [7, 8, 9, 255])),
            iend(),
        ]);

        let sequence = decode(Cursor::new(data)).unwrap();

        // a zero denominator counts as 100; the rest round to nearest
        assert_eq!(sequence.delays_ms(), &[50, 333, 667]);
    }

    #[test]
    fn test_lenient_missing_frames() {
        let data = stream(&[
            ihdr(2, 2, 8, 6, 0),
            actl(3, 1),
            fctl(0, 2, 2, 0, 0, 1, 10, DISPOSE_NONE, BLEND_SOURCE),
            idat(&solid_scanlines(2, 2, [255, 0, 0, 255])),
            fctl(1, 2, 2, 0, 0, 1, 10, DISPOSE_NONE, BLEND_SOURCE),
            fdat(2, &solid_scanlines(2, 2, [0, 0, 255, 255])),
            iend(),
        ]);

        let sequence = decode(Cursor::new(data)).unwrap();

        assert_eq!(sequence.len(), 2);
        assert_eq!(sequence.delays_ms().len(), 2);
    }

    #[test]
    fn test_empty_result() {
        let data = stream(&[
            ihdr(2, 2, 8, 6, 0),
            actl(1, 0),
            idat(&solid_scanlines(2, 2, [255, 0, 0, 255])),
            iend(),
        ]);

        match decode(Cursor::new(data)) {
            Err(ApngError::EmptyResult) => {}
            other => panic!("expected EmptyResult, got {:?}", other),
        }
    }

    #[test]
    fn test_not_png() {
        match decode(Cursor::new(b"GIF89a not a png".to_vec())) {
            Err(ApngError::NotPng) => {}
            other => panic!("expected NotPng, got {:?}", other),
        }

        match decode(Cursor::new(b"shrt".to_vec())) {
            Err(ApngError::NotPng) => {}
            other => panic!("expected NotPng, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_crc() {
        let mut data = solid_png(2, 2, [255, 0, 0, 255]);

        // last CRC byte of the IHDR chunk
        data[8 + 8 + 13 + 3] ^= 0xFF;

        match decode(Cursor::new(data)) {
            Err(ApngError::Malformed(_)) => {}
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_fdat() {
        let mut data = stream(&[
            ihdr(2, 2, 8, 6, 0),
            actl(2, 0),
            fctl(0, 2, 2, 0, 0, 1, 10, DISPOSE_NONE, BLEND_SOURCE),
            idat(&solid_scanlines(2, 2, [255, 0, 0, 255])),
        ]);

        // fdAT announcing more data than the stream holds
        data.extend_from_slice(&100u32.to_be_bytes());
        data.extend_from_slice(b"fdAT");
        data.extend_from_slice(&[0; 20]);

        match decode(Cursor::new(data)) {
            Err(ApngError::Malformed(_)) => {}
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_out_of_bounds() {
        let data = stream(&[
            ihdr(2, 2, 8, 6, 0),
            actl(1, 0),
            fctl(0, 2, 2, 1, 0, 1, 10, DISPOSE_NONE, BLEND_SOURCE),
            idat(&solid_scanlines(2, 2, [255, 0, 0, 255])),
            iend(),
        ]);

        match decode(Cursor::new(data)) {
            Err(ApngError::FrameOutOfBounds { .. }) => {}
            other => panic!("expected FrameOutOfBounds, got {:?}", other),
        }
    }

    #[test]
    fn test_grayscale_promotion() {
        let scanlines = [0, 64, 64, 0, 64, 64];
        let data = stream(&[ihdr(2, 2, 8, 0, 0), idat(&scanlines), iend()]);

        let sequence = decode(Cursor::new(data)).unwrap();

        assert_all_pixels(&sequence.frames()[0], [64, 64, 64, 255]);
    }

    #[test]
    fn test_palette_with_transparency() {
        let data = stream(&[
            ihdr(2, 1, 8, 3, 0),
            chunk(b"PLTE", &[255, 0, 0, 0, 255, 0]),
            chunk(b"tRNS", &[255, 0]),
            idat(&[0, 0, 1]),
            iend(),
        ]);

        let sequence = decode(Cursor::new(data)).unwrap();
        let frame = &sequence.frames()[0];

        assert_eq!(frame.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(frame.pixel(1, 0), [0, 255, 0, 0]);
    }

    #[test]
    fn test_sixteen_bit_strip() {
        let scanlines = [0, 0xAA, 0xBB, 0x11, 0x22, 0x33, 0x44];
        let data = stream(&[ihdr(1, 1, 16, 2, 0), idat(&scanlines), iend()]);

        let sequence = decode(Cursor::new(data)).unwrap();

        assert_eq!(sequence.frames()[0].pixel(0, 0), [0xAA, 0x11, 0x33, 255]);
    }

    #[test]
    fn test_interlaced_decode() {
        let c00 = [10, 20, 30, 255];
        let c10 = [40, 50, 60, 255];
        let c01 = [70, 80, 90, 255];
        let c11 = [100, 110, 120, 255];

        // Adam7 passes for a 2x2 image: pass 1 holds (0,0), pass 6 holds
        // (1,0), pass 7 holds the bottom row
        let mut raw = Vec::new();
        raw.push(0);
        raw.extend_from_slice(&c00);
        raw.push(0);
        raw.extend_from_slice(&c10);
        raw.push(0);
        raw.extend_from_slice(&c01);
        raw.extend_from_slice(&c11);

        let data = stream(&[ihdr(2, 2, 8, 6, 1), idat(&raw), iend()]);

        let sequence = decode(Cursor::new(data)).unwrap();
        let frame = &sequence.frames()[0];

        assert_eq!(frame.pixel(0, 0), c00);
        assert_eq!(frame.pixel(1, 0), c10);
        assert_eq!(frame.pixel(0, 1), c01);
        assert_eq!(frame.pixel(1, 1), c11);
    }

    #[test]
    fn test_decoder_info() {
        let mut gamma = Vec::new();
        gamma.extend_from_slice(&45455u32.to_be_bytes());

        let mut text = b"Comment".to_vec();
        text.push(0);
        text.extend_from_slice(b"hello");

        let data = stream(&[
            ihdr(2, 2, 8, 6, 0),
            chunk(b"gAMA", &gamma),
            chunk(b"tEXt", &text),
            actl(1, 3),
            idat(&solid_scanlines(2, 2, [0, 0, 0, 255])),
            fctl(0, 2, 2, 0, 0, 1, 10, DISPOSE_NONE, BLEND_SOURCE),
            fdat(1, &solid_scanlines(2, 2, [255, 255, 255, 255])),
            iend(),
        ]);

        let mut decoder = ApngDecoder::new(Cursor::new(data));
        decoder.decode().unwrap();

        let info = decoder.info();
        assert_eq!(info.width, 2);
        assert_eq!(info.height, 2);
        assert_eq!(info.bit_depth, 8);
        assert!(info.hidden_first_frame);
        assert_eq!(info.frame_controls.len(), 1);
        assert_eq!(info.animation.unwrap().num_frames, 1);
        assert_eq!(info.animation.unwrap().num_plays, 3);
        assert!((info.gamma.unwrap() - 0.45455).abs() < 1e-6);
        assert_eq!(info.text_chunks[0].keyword, "Comment");
        assert_eq!(info.text_chunks[0].text, "hello");
    }

    #[test]
    fn test_handler_playback() {
        let data = stream(&[
            ihdr(2, 2, 8, 6, 0),
            actl(2, 0),
            fctl(0, 2, 2, 0, 0, 10, 100, DISPOSE_NONE, BLEND_SOURCE),
            idat(&solid_scanlines(2, 2, [255, 0, 0, 255])),
            fctl(1, 2, 2, 0, 0, 20, 100, DISPOSE_NONE, BLEND_SOURCE),
            fdat(2, &solid_scanlines(2, 2, [0, 0, 255, 255])),
            iend(),
        ]);

        let mut handler = create_handler(Cursor::new(data));

        assert!(handler.can_read());
        assert_eq!(handler.image_count(), 2);
        assert_eq!(handler.loop_count(), -1);
        assert_eq!(handler.current_index(), 0);

        assert!(handler.supports_option(ImageOption::Animation));
        assert!(handler.supports_option(ImageOption::Size));
        assert_eq!(
            handler.option(ImageOption::Animation),
            Some(OptionValue::Animation(true))
        );
        assert_eq!(
            handler.option(ImageOption::Size),
            Some(OptionValue::Size { width: 2, height: 2 })
        );

        let mut frame = Raster::new(0, 0);

        assert!(handler.read(&mut frame));
        assert_eq!(frame.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(handler.current_index(), 1);
        assert_eq!(handler.next_delay_ms(), 100);

        assert!(handler.read(&mut frame));
        assert_eq!(frame.pixel(0, 0), [0, 0, 255, 255]);
        assert_eq!(handler.next_delay_ms(), 200);

        // cursor past the end wraps to the first frame
        assert!(handler.read(&mut frame));
        assert_eq!(frame.pixel(0, 0), [255, 0, 0, 255]);

        assert!(handler.jump_to(1));
        assert!(!handler.jump_to(5));
        assert!(!handler.jump_to_next());

        assert!(handler.jump_to(0));
        assert!(handler.jump_to_next());
    }

    #[test]
    fn test_handler_failed_decode() {
        let mut handler = create_handler(Cursor::new(b"definitely not a png".to_vec()));

        assert_eq!(handler.image_count(), 0);
        assert_eq!(handler.loop_count(), 0);
        assert_eq!(
            handler.option(ImageOption::Animation),
            Some(OptionValue::Animation(false))
        );
        assert_eq!(handler.option(ImageOption::Size), None);
        assert_eq!(handler.next_delay_ms(), 0);

        let mut frame = Raster::new(0, 0);
        assert!(!handler.read(&mut frame));
    }

    #[test]
    fn test_capabilities() {
        assert!(capabilities("apng").can_read);
        assert!(!capabilities("png").can_read);
        assert!(!capabilities("").can_read);
    }

    #[test]
    fn test_recognize_preserves_position() {
        let data = solid_png(1, 1, [9, 9, 9, 255]);
        let mut cursor = Cursor::new(data);

        assert!(apng::recognize(&mut cursor));
        assert_eq!(cursor.position(), 0);

        let mut garbage = Cursor::new(b"not a png at all".to_vec());
        assert!(!apng::recognize(&mut garbage));
        assert_eq!(garbage.position(), 0);
    }
}
