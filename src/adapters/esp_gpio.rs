//! ESP32 GPIO adapter over raw ESP-IDF sys calls.
//!
//! Digital pins go through `gpio_config` / `gpio_{get,set}_level`, analog
//! inputs through the ADC1 oneshot driver and analog outputs through
//! LEDC. Change interrupts push the pin number into
//! [`crate::events::PIN_EVENTS`].

use core::cell::Cell;

use embedded_hal::digital::PinState;
use esp_idf_svc::sys::*;
use log::{info, warn};

use crate::app::ports::GpioDriver;
use crate::events::notify_pin_change;
use crate::pins::{PinMode, PinNumber, PwmConfig};

/// ADC1 pad for each GPIO (ESP32-S3: GPIO1..=10 map to channels 0..=9).
fn adc1_channel(pin: PinNumber) -> Option<adc_channel_t> {
    (1..=10).contains(&pin).then(|| adc_channel_t::from(pin - 1))
}

pub struct EspGpio {
    adc: Cell<adc_oneshot_unit_handle_t>,
    isr_installed: Cell<bool>,
}

impl EspGpio {
    /// Brings up the ADC1 oneshot unit. Returns the ESP-IDF error code on
    /// failure.
    pub fn new() -> Result<Self, i32> {
        let init_cfg = adc_oneshot_unit_init_cfg_t {
            unit_id: adc_unit_t_ADC_UNIT_1,
            ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
            ..Default::default()
        };
        let mut handle: adc_oneshot_unit_handle_t = core::ptr::null_mut();
        // SAFETY: called once at startup; the handle outlives every read.
        let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &mut handle) };
        if ret != ESP_OK as i32 {
            return Err(ret);
        }
        info!("esp gpio: ADC1 oneshot ready");
        Ok(Self {
            adc: Cell::new(handle),
            isr_installed: Cell::new(false),
        })
    }

    fn config_channel(&self, channel: adc_channel_t) {
        let chan_cfg = adc_oneshot_chan_cfg_t {
            atten: adc_atten_t_ADC_ATTEN_DB_12,
            bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
        };
        // SAFETY: handle was created in `new`; main-loop access only.
        let ret = unsafe { adc_oneshot_config_channel(self.adc.get(), channel, &chan_cfg) };
        if ret != ESP_OK as i32 {
            warn!("esp gpio: ADC channel {} config failed (rc={})", channel, ret);
        }
    }
}

unsafe extern "C" fn pin_change_isr(arg: *mut core::ffi::c_void) {
    notify_pin_change(arg as usize as PinNumber);
}

impl GpioDriver for EspGpio {
    fn set_mode(&self, pin: PinNumber, mode: PinMode) {
        if let Some(channel) = adc1_channel(pin).filter(|_| mode == PinMode::AnalogInput) {
            self.config_channel(channel);
            return;
        }
        let (gpio_mode, pull_up, pull_down) = match mode {
            PinMode::DigitalInputPullUp => (gpio_mode_t_GPIO_MODE_INPUT, true, false),
            PinMode::DigitalInputPullDown => (gpio_mode_t_GPIO_MODE_INPUT, false, true),
            PinMode::DigitalOutputOpenDrain => (gpio_mode_t_GPIO_MODE_OUTPUT_OD, false, false),
            PinMode::DigitalOutputPushPull | PinMode::AnalogOutput => {
                (gpio_mode_t_GPIO_MODE_OUTPUT, false, false)
            }
            _ => (gpio_mode_t_GPIO_MODE_INPUT, false, false),
        };
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode,
            pull_up_en: gpio_pullup_t::from(pull_up),
            pull_down_en: gpio_pulldown_t::from(pull_down),
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        // SAFETY: gpio_config only touches the pins in the bit mask.
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            warn!("esp gpio {}: config failed (rc={})", pin, ret);
        }
    }

    fn read(&self, pin: PinNumber) -> PinState {
        // SAFETY: register read on a configured pin.
        PinState::from(unsafe { gpio_get_level(i32::from(pin)) } != 0)
    }

    fn write(&self, pin: PinNumber, state: PinState) {
        // SAFETY: register write on a configured output pin.
        unsafe { gpio_set_level(i32::from(pin), u32::from(state == PinState::High)) };
    }

    fn analog_read(&self, pin: PinNumber, bits: u8) -> u32 {
        let Some(channel) = adc1_channel(pin) else {
            return 0;
        };
        let mut raw: i32 = 0;
        // SAFETY: handle created in `new`; main-loop access only.
        let ret = unsafe { adc_oneshot_read(self.adc.get(), channel, &mut raw) };
        if ret != ESP_OK as i32 {
            return 0;
        }
        // converter runs at 12 bits; rescale to the requested width
        let raw = raw.max(0) as u32;
        if bits >= 12 {
            raw << (bits - 12)
        } else {
            raw >> (12 - bits)
        }
    }

    fn analog_write(&self, pin: PinNumber, value: u32, _bits: u8) {
        let channel = ledc_channel_t::from(pin % 8);
        // SAFETY: LEDC channel configured in `configure_pwm`.
        unsafe {
            ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel, value);
            ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel);
        }
    }

    fn configure_pwm(&self, pin: PinNumber, pwm: PwmConfig, bits: u8) {
        let timer = ledc_timer_config_t {
            speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
            duty_resolution: ledc_timer_bit_t::from(bits),
            timer_num: ledc_timer_t_LEDC_TIMER_0,
            freq_hz: pwm.frequency_hz as u32,
            clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
            ..Default::default()
        };
        let channel = ledc_channel_config_t {
            gpio_num: i32::from(pin),
            speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
            channel: ledc_channel_t::from(pwm.channel),
            timer_sel: ledc_timer_t_LEDC_TIMER_0,
            duty: 0,
            hpoint: 0,
            ..Default::default()
        };
        // SAFETY: plain configuration calls with stack-local structs.
        let ok = unsafe {
            ledc_timer_config(&timer) == ESP_OK as i32
                && ledc_channel_config(&channel) == ESP_OK as i32
        };
        if !ok {
            warn!("esp gpio {}: LEDC setup failed", pin);
        }
    }

    fn can_interrupt(&self, pin: PinNumber) -> bool {
        // strapping and flash pins stay polled
        pin < 48 && !matches!(pin, 0 | 3 | 45 | 46) && !(26..=32).contains(&pin)
    }

    fn attach_change_interrupt(&self, pin: PinNumber) -> bool {
        if !self.can_interrupt(pin) {
            return false;
        }
        // SAFETY: the ISR only pushes into the lock-free pin event queue.
        unsafe {
            if !self.isr_installed.get() {
                let ret = gpio_install_isr_service(0);
                if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
                    warn!("esp gpio: ISR service install failed (rc={})", ret);
                    return false;
                }
                self.isr_installed.set(true);
            }
            let gpio = i32::from(pin);
            gpio_set_intr_type(gpio, gpio_int_type_t_GPIO_INTR_ANYEDGE);
            let ret = gpio_isr_handler_add(gpio, Some(pin_change_isr), usize::from(pin) as *mut _);
            if ret != ESP_OK as i32 {
                warn!("esp gpio {}: ISR handler add failed (rc={})", pin, ret);
                return false;
            }
            gpio_intr_enable(gpio);
        }
        true
    }
}
