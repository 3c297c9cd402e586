//! 宏块解码性能基准测试.
//!
//! 覆盖 Intra16x16 残差解码与重建, 以及 P_Skip 的运动补偿路径.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use tao_avc::core::{BitReader, BitWriter};
use tao_avc::h264::{
    DecoderOptions, PicParams, Picture, RefPicture, SeqParams, SharedPicture, SliceData,
    SliceDecoder, SliceParams, SliceType, decode_picture,
};

const MB_WIDTH: usize = 40;
const MB_HEIGHT: usize = 30;

/// 每个宏块: Intra16x16 DC, 亮度 cbp=15, 一个 DC 系数, AC 全零
fn intra_slice_data(mb_count: usize) -> Vec<u8> {
    let mut bw = BitWriter::new();
    for _ in 0..mb_count {
        bw.write_ue(13);
        bw.write_ue(0);
        bw.write_se(0);
        // 亮度 DC: total_coeff=1, trailing_ones=1, 正号, total_zeros=0
        bw.write_bits(0b01, 2);
        bw.write_bit(0);
        bw.write_bit(1);
        for _ in 0..16 {
            bw.write_bit(1);
        }
    }
    bw.write_bit(1);
    bw.align_to_byte();
    bw.finish()
}

fn skip_slice_data(mb_count: usize) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_ue(mb_count as u32);
    bw.write_bit(1);
    bw.align_to_byte();
    bw.finish()
}

fn bench_intra16x16(c: &mut Criterion) {
    let sps = SeqParams::new(MB_WIDTH, MB_HEIGHT);
    let pps = PicParams::default();
    let data = intra_slice_data(sps.mb_count());

    c.bench_function("h264_intra16x16_slice_40x30", |b| {
        b.iter(|| {
            let picture = SharedPicture::new(Picture::<u8>::new(&sps), 0);
            let slice = SliceParams::new(SliceType::I, 0, 0, 26);
            let refs = [Vec::new(), Vec::new()];
            let decoder = SliceDecoder::new(&sps, &pps, slice, Arc::clone(&picture), refs);
            let Ok(mut decoder) = decoder else {
                panic!("创建 slice 解码器失败");
            };
            let stats = decoder.decode(&mut BitReader::new(black_box(&data)));
            black_box(stats.is_ok());
        });
    });
}

fn bench_p_skip(c: &mut Criterion) {
    let sps = SeqParams::new(MB_WIDTH, MB_HEIGHT);
    let pps = PicParams::default();
    let mut reference = Picture::<u8>::new(&sps);
    for (i, v) in reference.planes[0].data.iter_mut().enumerate() {
        *v = (i % 251) as u8;
    }
    let reference = SharedPicture::new(reference, 0);
    reference.progress().finish();
    let data = skip_slice_data(sps.mb_count());

    for threads in [1usize, 4] {
        let options = DecoderOptions {
            threads,
            strict: true,
        };
        c.bench_function(&format!("h264_p_skip_picture_40x30_t{threads}"), |b| {
            b.iter(|| {
                let picture = SharedPicture::new(Picture::<u8>::new(&sps), 2);
                let slices = vec![SliceData {
                    params: SliceParams::new(SliceType::P, 0, 0, 26),
                    refs: [vec![RefPicture::short_term(Arc::clone(&reference))], Vec::new()],
                    rbsp: black_box(&data[..]),
                    data_bit_offset: 0,
                }];
                black_box(decode_picture(&sps, &pps, &picture, slices, &options).is_ok());
            });
        });
    }
}

criterion_group!(benches, bench_intra16x16, bench_p_skip);
criterion_main!(benches);
